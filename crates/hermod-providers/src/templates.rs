//! Template rendering with database-backed templates and built-in defaults.
//!
//! Lookup order: tenant-specific row, global row, built-in default text.
//! Rendering is `{{variable}}` substitution; unknown variables become the
//! empty string. Loaded templates are cached for the process lifetime,
//! mirroring the tenant-config cache.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hermod_core::{
    storage, Channel, CoreError, MessageTemplate, RenderedMessage, Result, TemplateRenderer,
    TenantId,
};
use tokio::sync::RwLock;

/// Substitutes `{{variable}}` placeholders from the variable map.
///
/// Unknown or empty variables render as the empty string.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        match after_open.find("}}") {
            Some(close) => {
                let name = after_open[..close].trim();
                if let Some(value) = vars.get(name) {
                    output.push_str(value);
                }
                rest = &after_open[close + 2..];
            },
            None => {
                // Unterminated placeholder; emit the remainder verbatim.
                output.push_str(&rest[open..]);
                return output;
            },
        }
    }

    output.push_str(rest);
    output
}

fn builtin(event_type: &str, channel: Channel) -> Option<(&'static str, &'static str)> {
    match (event_type, channel) {
        ("service_reminder", Channel::Email) => Some((
            "2-Year Tune-Up Special",
            "Hi {{full_name}}, it has been almost two years since your {{model}} purchase. \
             Schedule a 2-Year Tune-Up Special to keep it running at peak performance.",
        )),
        ("appointment_confirmation", Channel::Sms) => Some((
            "",
            "Hi {{first_name}}, this is a reminder of your service appointment scheduled for \
             {{appointment_time}}. Reply YES to confirm or call us to reschedule.",
        )),
        ("invoice_reminder", Channel::Email) => Some((
            "Friendly invoice reminder",
            "Hello {{first_name}}, invoice #{{invoice_id}} is now {{days_past_due}} days past \
             due. Your outstanding balance is ${{balance}}. Please reply or log into your \
             portal to pay.",
        )),
        _ => None,
    }
}

/// Renderer using only the built-in default text.
///
/// This is the fallback inside [`DbTemplateRenderer`] and the renderer of
/// choice for tests that do not want a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplateRenderer;

impl DefaultTemplateRenderer {
    /// Creates the renderer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateRenderer for DefaultTemplateRenderer {
    async fn render(
        &self,
        event_type: &str,
        _tenant: &TenantId,
        channel: Channel,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedMessage> {
        let (subject, body) = builtin(event_type, channel).ok_or_else(|| {
            CoreError::not_found(format!("no template for event {event_type} over {channel}"))
        })?;

        Ok(RenderedMessage {
            subject: substitute(subject, vars),
            body: substitute(body, vars),
            html_body: None,
        })
    }
}

/// Database-backed renderer with a process-lifetime cache.
pub struct DbTemplateRenderer {
    templates: Arc<storage::templates::Repository>,
    cache: RwLock<HashMap<String, Option<Arc<MessageTemplate>>>>,
    fallback: DefaultTemplateRenderer,
}

impl DbTemplateRenderer {
    /// Creates the renderer over the template repository.
    pub fn new(templates: Arc<storage::templates::Repository>) -> Self {
        Self { templates, cache: RwLock::new(HashMap::new()), fallback: DefaultTemplateRenderer }
    }

    async fn load(
        &self,
        tenant: &TenantId,
        event_type: &str,
        channel: Channel,
    ) -> Result<Option<Arc<MessageTemplate>>> {
        let key = format!("{tenant}:{event_type}:{channel}");

        if let Some(cached) = self.cache.read().await.get(&key) {
            return Ok(cached.clone());
        }

        let loaded = self
            .templates
            .find(tenant, event_type, &channel.to_string())
            .await?
            .map(Arc::new);

        self.cache.write().await.insert(key, loaded.clone());
        Ok(loaded)
    }
}

#[async_trait]
impl TemplateRenderer for DbTemplateRenderer {
    async fn render(
        &self,
        event_type: &str,
        tenant: &TenantId,
        channel: Channel,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedMessage> {
        let Some(template) = self.load(tenant, event_type, channel).await? else {
            return self.fallback.render(event_type, tenant, channel, vars).await;
        };

        let body = substitute(&template.body_text_template, vars);
        let html_body = match template.body_html_template.as_deref().filter(|v| !v.is_empty()) {
            Some(html) => substitute(html, vars),
            // Preserve line breaks when the text body doubles as HTML.
            None => body.replace('\n', "<br>\n"),
        };

        Ok(RenderedMessage {
            subject: substitute(&template.subject_template, vars),
            body,
            html_body: Some(html_body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_variables_and_blanks_unknown_ones() {
        let out = substitute(
            "Hi {{ first_name }}, your {{model}} is ready. {{missing}}!",
            &vars(&[("first_name", "Ada"), ("model", "X300")]),
        );
        assert_eq!(out, "Hi Ada, your X300 is ready. !");
    }

    #[test]
    fn unterminated_placeholder_is_emitted_verbatim() {
        let out = substitute("Hello {{name", &vars(&[("name", "Ada")]));
        assert_eq!(out, "Hello {{name");
    }

    #[tokio::test]
    async fn default_renderer_produces_service_reminder_text() {
        let renderer = DefaultTemplateRenderer::new();
        let rendered = renderer
            .render(
                "service_reminder",
                &TenantId::new("t1"),
                Channel::Email,
                &vars(&[("full_name", "Ada Lovelace"), ("model", "X300")]),
            )
            .await
            .unwrap();

        assert_eq!(rendered.subject, "2-Year Tune-Up Special");
        assert!(rendered.body.starts_with("Hi Ada Lovelace, it has been almost two years"));
        assert!(rendered.body.contains("your X300 purchase"));
    }

    #[tokio::test]
    async fn unknown_event_type_is_not_found() {
        let renderer = DefaultTemplateRenderer::new();
        let err = renderer
            .render("birthday_wish", &TenantId::new("t1"), Channel::Email, &HashMap::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no template for event birthday_wish"));
    }
}
