//! Banner, footer, intro and outro text shared by every chunk

use super::options::OutputOptions;
use crate::error::Result;
use crate::plugins::{AddonHook, PluginContext, PluginManager};

/// Addon text computed once per generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addons {
    pub banner: String,
    pub footer: String,
    pub intro: String,
    pub outro: String,
}

impl Addons {
    /// Combine the option text with the text of every plugin's addon hooks
    pub async fn resolve(options: &OutputOptions, plugins: &PluginManager, ctx: &PluginContext) -> Result<Self> {
        Ok(Self {
            banner: join(options.banner.as_deref(), plugins.addon(AddonHook::Banner, ctx).await?),
            footer: join(options.footer.as_deref(), plugins.addon(AddonHook::Footer, ctx).await?),
            intro: join(options.intro.as_deref(), plugins.addon(AddonHook::Intro, ctx).await?),
            outro: join(options.outro.as_deref(), plugins.addon(AddonHook::Outro, ctx).await?),
        })
    }
}

fn join(option: Option<&str>, parts: Vec<String>) -> String {
    option
        .filter(|text| !text.is_empty())
        .map(String::from)
        .into_iter()
        .chain(parts)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::plugins::{BannerPlugin, Plugin};

    struct Outro;

    #[async_trait]
    impl Plugin for Outro {
        fn name(&self) -> &str {
            "outro"
        }

        async fn outro(&self, _ctx: &PluginContext) -> anyhow::Result<Option<String>> {
            Ok(Some("console.log('done');".to_string()))
        }
    }

    #[tokio::test]
    async fn test_option_text_comes_before_plugin_text() {
        let mut plugins = PluginManager::new();
        plugins.register(Arc::new(BannerPlugin {
            text: "/* plugin */".to_string(),
        }));
        plugins.register(Arc::new(Outro));

        let options = OutputOptions {
            banner: Some("/* option */".to_string()),
            intro: Some(String::new()),
            ..OutputOptions::default()
        };
        let ctx = PluginContext::new(PathBuf::from("."), "[name][extname]");

        let addons = Addons::resolve(&options, &plugins, &ctx).await.unwrap();
        assert_eq!(addons.banner, "/* option */\n/* plugin */");
        assert_eq!(addons.intro, "");
        assert_eq!(addons.outro, "console.log('done');");
        assert_eq!(addons.footer, "");
    }
}
