//! Message templates.
//!
//! A [`TemplateSet`] is compiled once per configuration generation. It holds
//! the built-in `link_title` / `link_content` partials, every user template
//! file (registered as a partial named after its file stem, so a file named
//! `link_title.hbs` replaces the built-in), and one title/text template pair
//! per target.

use crate::config::{Config, Mention, Target};
use crate::models::WebhookMessage;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const LINK_TITLE: &str = "[{{status}}:{{len alerts}}] {{#each groupLabels}}{{this}} {{/each}}";

pub const LINK_CONTENT: &str = r#"#### [{{status}}:{{len alerts}}] {{#each groupLabels}}{{this}} {{/each}}

{{#each alerts}}
**Alert {{@index}}** ({{status}})

{{#each annotations}}
- {{@key}}: {{this}}
{{/each}}

**Labels**

{{#each labels}}
- {{@key}}: {{this}}
{{/each}}
- Started: {{startsAt}}
{{#if (eq status "resolved")}}
- Ended: {{endsAt}}
{{/if}}

[Source]({{generatorURL}})

{{/each}}
[Alertmanager]({{externalURL}})
"#;

const DEFAULT_TITLE: &str = "default/title";
const DEFAULT_TEXT: &str = "default/text";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid template file name: {0:?}")]
    InvalidName(PathBuf),
    #[error("failed to compile template {name:?}: {source}")]
    Compile {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}

/// A rendered title/text pair, ready to be wrapped into a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub title: String,
    pub text: String,
}

/// What a template sees: the Alertmanager message plus the resolved target.
#[derive(Serialize)]
struct RenderContext<'a> {
    #[serde(flatten)]
    message: &'a WebhookMessage,
    target: TargetContext<'a>,
}

#[derive(Serialize)]
struct TargetContext<'a> {
    name: &'a str,
    mention: Option<&'a Mention>,
}

/// The compiled templates of one configuration generation.
pub struct TemplateSet {
    registry: Handlebars<'static>,
}

impl TemplateSet {
    /// A set with nothing registered; only valid alongside an empty target table.
    pub fn empty() -> Self {
        Self {
            registry: Handlebars::new(),
        }
    }

    /// Reads every template file listed in the config and compiles the set.
    pub async fn load(config: &Config) -> Result<Self, TemplateError> {
        let mut partials = Vec::with_capacity(config.templates.len());
        for path in &config.templates {
            partials.push(load_partial_from_file(path).await?);
        }
        Self::compile(config, partials)
    }

    /// Compiles the built-ins, the given partials and the per-target messages.
    pub fn compile(
        config: &Config,
        partials: Vec<(String, String)>,
    ) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        // Output is markdown, not HTML.
        registry.register_escape_fn(handlebars::no_escape);

        let builtins = [
            ("link_title".to_string(), LINK_TITLE.to_string()),
            ("link_content".to_string(), LINK_CONTENT.to_string()),
        ];
        for (name, source) in builtins.into_iter().chain(partials) {
            registry
                .register_partial(&name, &source)
                .map_err(|e| compile_error(&name, e))?;
        }

        register(&mut registry, DEFAULT_TITLE, &config.default_message.title)?;
        register(&mut registry, DEFAULT_TEXT, &config.default_message.text)?;

        for (name, target) in &config.targets {
            let overrides = target.message.clone().unwrap_or_default();
            let title = overrides
                .title
                .unwrap_or_else(|| config.default_message.title.clone());
            let text = overrides
                .text
                .unwrap_or_else(|| config.default_message.text.clone());
            register(&mut registry, &title_name(name), &title)?;
            register(&mut registry, &text_name(name), &text)?;
        }

        Ok(Self { registry })
    }

    /// Renders the title and text for `target`.
    ///
    /// Targets unknown to this set use the default message.
    pub fn render(
        &self,
        target: &Target,
        message: &WebhookMessage,
    ) -> Result<RenderedMessage, handlebars::RenderError> {
        let context = RenderContext {
            message,
            target: TargetContext {
                name: &target.name,
                mention: target.mention.as_ref(),
            },
        };

        let (title_tpl, text_tpl) = if self.registry.has_template(&title_name(&target.name)) {
            (title_name(&target.name), text_name(&target.name))
        } else {
            (DEFAULT_TITLE.to_string(), DEFAULT_TEXT.to_string())
        };

        let title = self.registry.render(&title_tpl, &context)?;
        let text = self.registry.render(&text_tpl, &context)?;
        Ok(RenderedMessage {
            title: title.trim().to_string(),
            text: text.trim().to_string(),
        })
    }
}

fn title_name(target: &str) -> String {
    format!("targets/{}/title", target)
}

fn text_name(target: &str) -> String {
    format!("targets/{}/text", target)
}

fn register(
    registry: &mut Handlebars<'static>,
    name: &str,
    source: &str,
) -> Result<(), TemplateError> {
    registry
        .register_template_string(name, source)
        .map_err(|e| compile_error(name, e))
}

fn compile_error(name: &str, source: handlebars::TemplateError) -> TemplateError {
    TemplateError::Compile {
        name: name.to_string(),
        source: Box::new(source),
    }
}

/// Loads a template file, naming the partial after the file stem.
pub async fn load_partial_from_file<P: AsRef<Path>>(
    file_path: P,
) -> Result<(String, String), TemplateError> {
    let path = file_path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| TemplateError::InvalidName(path.to_path_buf()))?
        .to_string();

    Ok((name, content))
}
