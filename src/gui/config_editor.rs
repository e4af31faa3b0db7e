/// Configuration dialog for the shared Azure AI settings
use iced::{
    widget::{Button, Checkbox, Column, Container, Row, Space, Text, TextInput},
    Alignment, Element, Length,
};

use crate::config::GlobalConfig;
use crate::gui::Message;

#[derive(Debug, Clone)]
pub enum ConfigMessage {
    OpenAiEndpoint(String),
    OpenAiApiKey(String),
    OpenAiApiVersion(String),
    OpenAiDeployment(String),
    DocIntelEndpoint(String),
    DocIntelApiKey(String),
    PreferEnvVars(bool),
    Timeout(String),
    MaxRetries(String),
}

/// Text-field copy of the configuration while the dialog is open
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditingConfig {
    pub openai_endpoint: String,
    pub openai_api_key: String,
    pub openai_api_version: String,
    pub openai_deployment: String,
    pub doc_intel_endpoint: String,
    pub doc_intel_api_key: String,
    pub prefer_env_vars: bool,
    pub timeout: String,
    pub max_retries: String,
}

impl From<&GlobalConfig> for EditingConfig {
    fn from(config: &GlobalConfig) -> Self {
        EditingConfig {
            openai_endpoint: config.azure_openai.endpoint.clone(),
            openai_api_key: config.azure_openai.api_key.clone(),
            openai_api_version: config.azure_openai.api_version.clone(),
            openai_deployment: config.azure_openai.deployment_name.clone(),
            doc_intel_endpoint: config.azure_document_intelligence.endpoint.clone(),
            doc_intel_api_key: config.azure_document_intelligence.api_key.clone(),
            prefer_env_vars: config.settings.prefer_env_vars,
            timeout: config.settings.timeout.to_string(),
            max_retries: config.settings.max_retries.to_string(),
        }
    }
}

impl EditingConfig {
    pub fn update(&mut self, message: ConfigMessage) {
        match message {
            ConfigMessage::OpenAiEndpoint(v) => self.openai_endpoint = v,
            ConfigMessage::OpenAiApiKey(v) => self.openai_api_key = v,
            ConfigMessage::OpenAiApiVersion(v) => self.openai_api_version = v,
            ConfigMessage::OpenAiDeployment(v) => self.openai_deployment = v,
            ConfigMessage::DocIntelEndpoint(v) => self.doc_intel_endpoint = v,
            ConfigMessage::DocIntelApiKey(v) => self.doc_intel_api_key = v,
            ConfigMessage::PreferEnvVars(v) => self.prefer_env_vars = v,
            ConfigMessage::Timeout(v) => self.timeout = v,
            ConfigMessage::MaxRetries(v) => self.max_retries = v,
        }
    }

    /// Write the edited fields over `base`. Unparseable numbers keep the
    /// value from `base`; unknown keys in `base` are untouched.
    pub fn apply_to(&self, mut base: GlobalConfig) -> GlobalConfig {
        base.azure_openai.endpoint = self.openai_endpoint.trim().to_string();
        base.azure_openai.api_key = self.openai_api_key.trim().to_string();
        base.azure_openai.api_version = self.openai_api_version.trim().to_string();
        base.azure_openai.deployment_name = self.openai_deployment.trim().to_string();
        base.azure_document_intelligence.endpoint = self.doc_intel_endpoint.trim().to_string();
        base.azure_document_intelligence.api_key = self.doc_intel_api_key.trim().to_string();
        base.settings.prefer_env_vars = self.prefer_env_vars;

        if let Ok(timeout) = self.timeout.trim().parse() {
            base.settings.timeout = timeout;
        }
        if let Ok(retries) = self.max_retries.trim().parse() {
            base.settings.max_retries = retries;
        }
        base
    }
}

fn labeled_input<'a>(
    label: &'a str,
    placeholder: &'a str,
    value: &'a str,
    secure: bool,
    on_input: fn(String) -> ConfigMessage,
) -> Element<'a, Message> {
    Row::new()
        .spacing(10)
        .align_items(Alignment::Center)
        .push(Text::new(label).size(13).width(Length::Fixed(140.0)))
        .push(
            TextInput::new(placeholder, value)
                .on_input(move |v| Message::Config(on_input(v)))
                .secure(secure)
                .padding(5)
                .width(Length::Fill),
        )
        .into()
}

pub fn render_editor<'a>(editing: &'a EditingConfig, status_text: &str) -> Element<'a, Message> {
    let openai = Column::new()
        .spacing(6)
        .push(Text::new("Azure OpenAI").size(15))
        .push(labeled_input(
            "Endpoint",
            "https://<resource>.openai.azure.com",
            &editing.openai_endpoint,
            false,
            ConfigMessage::OpenAiEndpoint,
        ))
        .push(labeled_input(
            "API Key",
            "Not saved to disk",
            &editing.openai_api_key,
            true,
            ConfigMessage::OpenAiApiKey,
        ))
        .push(labeled_input(
            "API Version",
            "2024-02-15-preview",
            &editing.openai_api_version,
            false,
            ConfigMessage::OpenAiApiVersion,
        ))
        .push(labeled_input(
            "Deployment",
            "gpt-4",
            &editing.openai_deployment,
            false,
            ConfigMessage::OpenAiDeployment,
        ));

    let doc_intel = Column::new()
        .spacing(6)
        .push(Text::new("Azure Document Intelligence").size(15))
        .push(labeled_input(
            "Endpoint",
            "https://<resource>.cognitiveservices.azure.com",
            &editing.doc_intel_endpoint,
            false,
            ConfigMessage::DocIntelEndpoint,
        ))
        .push(labeled_input(
            "API Key",
            "Not saved to disk",
            &editing.doc_intel_api_key,
            true,
            ConfigMessage::DocIntelApiKey,
        ))
        .push(Space::new(Length::Fill, Length::Fixed(8.0)))
        .push(Text::new("Settings").size(15))
        .push(
            Checkbox::new("Environment variables override file values", editing.prefer_env_vars)
                .on_toggle(|v| Message::Config(ConfigMessage::PreferEnvVars(v))),
        )
        .push(labeled_input(
            "Timeout (s)",
            "60",
            &editing.timeout,
            false,
            ConfigMessage::Timeout,
        ))
        .push(labeled_input(
            "Max Retries",
            "3",
            &editing.max_retries,
            false,
            ConfigMessage::MaxRetries,
        ));

    let actions = Row::new()
        .spacing(10)
        .align_items(Alignment::Center)
        .push(
            Button::new(Text::new("💾 Save"))
                .on_press(Message::SaveConfig)
                .padding(8),
        )
        .push(
            Button::new(Text::new("📁 Open Config Folder"))
                .on_press(Message::OpenConfigFolder)
                .padding(8),
        )
        .push(Text::new(status_text.to_string()).size(12));

    let content = Column::new()
        .spacing(12)
        .padding(10)
        .push(
            Row::new()
                .spacing(30)
                .push(Container::new(openai).width(Length::FillPortion(1)))
                .push(Container::new(doc_intel).width(Length::FillPortion(1))),
        )
        .push(actions);

    Container::new(content).width(Length::Fill).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_editing_round_trips_config() {
        let mut config = GlobalConfig::default();
        config.azure_openai.endpoint = "https://a".to_string();
        config.extra.insert("ocr".to_string(), Value::Bool(true));

        let editing = EditingConfig::from(&config);
        assert_eq!(editing.timeout, "60");
        assert_eq!(editing.apply_to(config.clone()), config);
    }

    #[test]
    fn test_update_and_apply() {
        let config = GlobalConfig::default();
        let mut editing = EditingConfig::from(&config);

        editing.update(ConfigMessage::OpenAiApiKey(" key ".to_string()));
        editing.update(ConfigMessage::OpenAiEndpoint("https://e".to_string()));
        editing.update(ConfigMessage::Timeout("120".to_string()));
        editing.update(ConfigMessage::MaxRetries("many".to_string()));
        editing.update(ConfigMessage::PreferEnvVars(false));

        let updated = editing.apply_to(config);
        assert_eq!(updated.azure_openai.api_key, "key");
        assert!(updated.is_openai_configured());
        assert_eq!(updated.settings.timeout, 120);
        assert_eq!(updated.settings.max_retries, 3);
        assert!(!updated.settings.prefer_env_vars);
    }
}
