//! Catalog cache for locations, sizes and images.
//!
//! Each category is fetched in one batch and indexed twice: by the
//! provider-assigned ID and by display name. Entries are stored once; both
//! lookup maps point into the same arena. A [`CatalogCache`] belongs to a
//! single orchestration run and is populated lazily on first resolution.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::gateway::Query;
use crate::listing::{self, string_field, Listing};

/// Catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Datacenter locations (`DCID`).
    Locations,
    /// VPS plans (`VPSPLANID`).
    Sizes,
    /// Operating system images (`OSID`).
    Images,
}

impl Category {
    /// All categories, in refresh order.
    pub const ALL: [Self; 3] = [Self::Locations, Self::Sizes, Self::Images];

    /// Listing endpoint backing this category.
    #[must_use]
    pub const fn listing(self) -> Listing {
        match self {
            Self::Locations => Listing::Locations,
            Self::Sizes => Listing::Sizes,
            Self::Images => Listing::Images,
        }
    }

    /// Field carrying the provider ID in each entry.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::Locations => "DCID",
            Self::Sizes => "VPSPLANID",
            Self::Images => "OSID",
        }
    }

    /// Request field resolved against this category.
    #[must_use]
    pub const fn request_field(self) -> &'static str {
        match self {
            Self::Locations => "location",
            Self::Sizes => "size",
            Self::Images => "image",
        }
    }
}

/// Category-specific metadata of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetails {
    Location {
        region_code: Option<String>,
        country: Option<String>,
        continent: Option<String>,
    },
    Size {
        vcpu_count: Option<u32>,
        ram_mb: Option<u64>,
        disk_gb: Option<u64>,
        bandwidth_tb: Option<f64>,
        price_per_month: Option<f64>,
    },
    Image {
        arch: Option<String>,
        family: Option<String>,
        windows: bool,
    },
}

impl EntryDetails {
    fn parse(category: Category, raw: &Map<String, Value>) -> Self {
        fn number<T: std::str::FromStr>(raw: &Map<String, Value>, key: &str) -> Option<T> {
            string_field(raw, key).and_then(|s| s.trim().parse().ok())
        }

        match category {
            Category::Locations => Self::Location {
                region_code: string_field(raw, "regioncode"),
                country: string_field(raw, "country"),
                continent: string_field(raw, "continent"),
            },
            Category::Sizes => Self::Size {
                vcpu_count: number(raw, "vcpu_count"),
                ram_mb: number(raw, "ram"),
                disk_gb: number(raw, "disk"),
                bandwidth_tb: number(raw, "bandwidth"),
                price_per_month: number(raw, "price_per_month"),
            },
            Category::Images => Self::Image {
                arch: string_field(raw, "arch"),
                family: string_field(raw, "family"),
                windows: raw.get("windows").and_then(Value::as_bool).unwrap_or(false),
            },
        }
    }
}

/// One available location, size or image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    /// Provider-assigned ID.
    pub provider_id: String,
    /// Display name, unique within its category.
    pub display_name: String,
    /// Parsed metadata.
    pub details: EntryDetails,
    /// Entry as returned by the provider.
    pub raw: Map<String, Value>,
}

/// Two-key index over one category.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    category: Category,
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl CatalogIndex {
    /// Build the index from an ID-keyed listing.
    ///
    /// The provider ID comes from the category's ID field, falling back to the
    /// listing key. An entry with a duplicate ID is skipped; one with a taken
    /// display name is indexed by ID only, the first holder keeps the name.
    #[must_use]
    pub fn from_listing(category: Category, listing: Map<String, Value>) -> Self {
        let mut index = Self {
            category,
            entries: Vec::with_capacity(listing.len()),
            by_id: HashMap::with_capacity(listing.len()),
            by_name: HashMap::with_capacity(listing.len()),
        };

        for (key, value) in listing {
            let Value::Object(raw) = value else {
                warn!(category = ?category, key = %key, "Skipping non-object catalog entry");
                continue;
            };
            let provider_id = string_field(&raw, category.id_field()).unwrap_or(key);
            let display_name = string_field(&raw, "name").unwrap_or_else(|| provider_id.clone());

            if index.by_id.contains_key(&provider_id) {
                warn!(category = ?category, provider_id = %provider_id, "Skipping duplicate catalog ID");
                continue;
            }

            let slot = index.entries.len();
            index.by_id.insert(provider_id.clone(), slot);
            if index.by_name.contains_key(&display_name) {
                warn!(
                    category = ?category,
                    provider_id = %provider_id,
                    display_name = %display_name,
                    "Display name already taken, entry reachable by ID only"
                );
            } else {
                index.by_name.insert(display_name.clone(), slot);
            }
            index.entries.push(CatalogEntry {
                details: EntryDetails::parse(category, &raw),
                provider_id,
                display_name,
                raw,
            });
        }

        index
    }

    /// Category of this index.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Look up by ID first, then by display name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.by_id
            .get(key)
            .or_else(|| self.by_name.get(key))
            .map(|&slot| &self.entries[slot])
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }
}

/// One consistent snapshot of all three categories.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    locations: CatalogIndex,
    sizes: CatalogIndex,
    images: CatalogIndex,
}

impl CatalogSnapshot {
    /// Fetch every category, one listing call each.
    ///
    /// # Errors
    /// Returns the first gateway error.
    pub async fn fetch(gateway: &dyn Query) -> Result<Self, ProvisionError> {
        Ok(Self {
            locations: Self::fetch_index(gateway, Category::Locations).await?,
            sizes: Self::fetch_index(gateway, Category::Sizes).await?,
            images: Self::fetch_index(gateway, Category::Images).await?,
        })
    }

    async fn fetch_index(
        gateway: &dyn Query,
        category: Category,
    ) -> Result<CatalogIndex, ProvisionError> {
        let entries = listing::list(gateway, category.listing()).await?;
        Ok(CatalogIndex::from_listing(category, entries))
    }

    /// Index for one category.
    #[must_use]
    pub const fn index(&self, category: Category) -> &CatalogIndex {
        match category {
            Category::Locations => &self.locations,
            Category::Sizes => &self.sizes,
            Category::Images => &self.images,
        }
    }
}

/// Lazily populated, per-run catalog cache.
pub struct CatalogCache<'a> {
    gateway: &'a dyn Query,
    snapshot: Option<CatalogSnapshot>,
}

impl<'a> CatalogCache<'a> {
    /// Create an empty cache. Nothing is fetched until the first lookup.
    #[must_use]
    pub fn new(gateway: &'a dyn Query) -> Self {
        Self {
            gateway,
            snapshot: None,
        }
    }

    /// Replace the whole snapshot with freshly fetched data.
    ///
    /// On error the previous snapshot is kept untouched.
    ///
    /// # Errors
    /// Returns the first gateway error.
    pub async fn refresh(&mut self) -> Result<&CatalogSnapshot, ProvisionError> {
        let snapshot = CatalogSnapshot::fetch(self.gateway).await?;
        info!(
            locations = snapshot.locations.len(),
            sizes = snapshot.sizes.len(),
            images = snapshot.images.len(),
            "Catalog refreshed"
        );
        Ok(self.snapshot.insert(snapshot))
    }

    /// Current snapshot, fetching it on first use.
    ///
    /// # Errors
    /// Returns the gateway error if the first refresh fails.
    pub async fn snapshot(&mut self) -> Result<&CatalogSnapshot, ProvisionError> {
        match self.snapshot.take() {
            Some(snapshot) => Ok(self.snapshot.insert(snapshot)),
            None => self.refresh().await,
        }
    }

    /// Look up an entry by ID or display name.
    ///
    /// # Errors
    /// Returns [`ProvisionError::UnresolvedReference`] when neither key matches.
    pub async fn entry(
        &mut self,
        category: Category,
        key: &str,
    ) -> Result<&CatalogEntry, ProvisionError> {
        let key = key.trim();
        self.snapshot()
            .await?
            .index(category)
            .get(key)
            .ok_or_else(|| ProvisionError::UnresolvedReference {
                field: category.request_field(),
                value: key.to_string(),
            })
    }

    /// Resolve a key to the provider ID.
    ///
    /// # Errors
    /// Returns [`ProvisionError::UnresolvedReference`] when neither key matches.
    pub async fn resolve(&mut self, category: Category, key: &str) -> Result<String, ProvisionError> {
        let entry = self.entry(category, key).await?;
        debug!(
            category = ?category,
            key = %key,
            provider_id = %entry.provider_id,
            "Resolved catalog reference"
        );
        Ok(entry.provider_id.clone())
    }
}
