//! Userdata sourcing, templating and encoding.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use handlebars::Handlebars;
use serde_json::Value;
use tracing::debug;

use crate::error::ProvisionError;
use crate::request::CreationRequest;

/// Templating collaborator for file-sourced userdata.
pub trait TemplateRenderer: Send + Sync {
    /// Render `raw` through the renderer named `template`, with `data` in scope.
    ///
    /// # Errors
    /// Returns [`ProvisionError::MalformedInput`] for an unknown renderer or a
    /// template that fails to render.
    fn render(&self, template: &str, raw: &str, data: &Value) -> Result<String, ProvisionError>;
}

/// Handlebars renderer, selected by the names `handlebars` or `hbs`.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Renderer names accepted by this implementation.
    pub const NAMES: [&'static str; 2] = ["handlebars", "hbs"];

    #[must_use]
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, raw: &str, data: &Value) -> Result<String, ProvisionError> {
        if !Self::NAMES.contains(&template) {
            return Err(ProvisionError::MalformedInput(format!(
                "unknown userdata template renderer '{template}'"
            )));
        }
        self.registry
            .render_template(raw, data)
            .map_err(|e| ProvisionError::MalformedInput(format!("userdata template: {e}")))
    }
}

/// Produce the base64 payload for the `userdata` submission field.
///
/// A value naming an existing file is read (and rendered when the request
/// names a template); anything else is sent as the literal payload.
///
/// # Errors
/// [`ProvisionError::MalformedInput`] if the file cannot be read or rendered.
pub async fn prepare_userdata(
    renderer: &dyn TemplateRenderer,
    request: &CreationRequest,
) -> Result<Option<String>, ProvisionError> {
    let Some(source) = request.userdata.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let is_file = tokio::fs::metadata(Path::new(source))
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);

    let payload = if is_file {
        let raw = tokio::fs::read_to_string(source).await.map_err(|e| {
            ProvisionError::MalformedInput(format!("failed to read userdata file {source}: {e}"))
        })?;
        match request.userdata_template.as_deref() {
            Some(template) => {
                debug!(path = %source, template, "Rendering userdata file");
                let data = serde_json::to_value(request)?;
                renderer.render(template, &raw, &data)?
            }
            None => {
                debug!(path = %source, "Using userdata file as is");
                raw
            }
        }
    } else {
        debug!("Using literal userdata");
        source.to_string()
    };

    Ok(Some(STANDARD.encode(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn decode(payload: &str) -> String {
        String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap()
    }

    #[test]
    fn test_handlebars_does_not_escape() {
        let renderer = HandlebarsRenderer::new();
        let out = renderer
            .render("hbs", "echo '{{name}}' > /etc/hostname", &json!({"name": "a&b"}))
            .unwrap();
        assert_eq!(out, "echo 'a&b' > /etc/hostname");
    }

    #[test]
    fn test_unknown_renderer_rejected() {
        let err = HandlebarsRenderer::new()
            .render("jinja", "x", &json!({}))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedInput(_)));
    }

    #[tokio::test]
    async fn test_literal_userdata_is_encoded() {
        let request = CreationRequest::new("host1", "i", "s", "l")
            .with_userdata("#!/bin/sh\necho hi", None);
        let payload = prepare_userdata(&HandlebarsRenderer::new(), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&payload), "#!/bin/sh\necho hi");
    }

    #[tokio::test]
    async fn test_file_userdata_is_rendered() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "#cloud-config\nhostname: {{{{name}}}}\n").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let request = CreationRequest::new("host1", "i", "s", "l").with_userdata(&path, Some("handlebars"));
        let payload = prepare_userdata(&HandlebarsRenderer::new(), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&payload), "#cloud-config\nhostname: host1\n");

        let request = CreationRequest::new("host1", "i", "s", "l").with_userdata(&path, None);
        let payload = prepare_userdata(&HandlebarsRenderer::new(), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&payload), "#cloud-config\nhostname: {{name}}\n");
    }

    #[tokio::test]
    async fn test_no_userdata() {
        let request = CreationRequest::new("host1", "i", "s", "l");
        assert!(prepare_userdata(&HandlebarsRenderer::new(), &request)
            .await
            .unwrap()
            .is_none());
    }
}
