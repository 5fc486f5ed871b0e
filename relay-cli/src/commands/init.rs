//! `relay init --host <domain> --sync-token <token> [--force]`

use anyhow::{bail, Context, Result};
use clap::Args;

use relay_core::{
    files, Catalog, DateField, EntitySchema, SchemaRegistry, Specialization, SyncSettings,
};

/// Write ~/.relay/config.yaml, plus schema.yaml and catalog.yaml when absent.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Domain this deployment serves (e.g. "shop.example.com").
    #[arg(long)]
    pub host: String,

    /// Secret shared by every platform. Can be overridden at runtime with
    /// RELAY_SYNC_TOKEN.
    #[arg(long)]
    pub sync_token: String,

    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = files::home().context("could not determine home directory")?;
        let config_path = files::config_path_at(&home);
        if config_path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite",
                config_path.display()
            );
        }

        let settings = SyncSettings::new(self.host, self.sync_token);
        settings.validate().context("invalid settings")?;
        settings
            .save_at(&home)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("✓ Wrote {}", config_path.display());

        let schema_path = files::schema_path_at(&home);
        if !schema_path.exists() {
            starter_schema()
                .save_at(&home)
                .with_context(|| format!("failed to write {}", schema_path.display()))?;
            println!("✓ Wrote starter schema to {}", schema_path.display());
        }

        let catalog_path = files::catalog_path_at(&home);
        if !catalog_path.exists() {
            Catalog::default()
                .save_at(&home)
                .with_context(|| format!("failed to write {}", catalog_path.display()))?;
            println!("✓ Wrote empty catalog to {}", catalog_path.display());
        }

        println!("Next: relay platform add <name> --domain <domain> --token <token>");
        Ok(())
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Users, posts and pages with their usual meta tables.
fn starter_schema() -> SchemaRegistry {
    let user = EntitySchema {
        key_field: "id".into(),
        main_fields: fields(&[
            "id",
            "user_login",
            "user_nicename",
            "user_email",
            "user_url",
            "user_registered",
            "user_status",
            "display_name",
        ]),
        meta_table: "usermeta".into(),
        meta_foreign_key: "user_id".into(),
        date_fields: vec![DateField {
            name: "user_registered".into(),
            default_now: true,
        }],
        specialization: None,
    };
    let post = EntitySchema {
        key_field: "ID".into(),
        main_fields: fields(&[
            "ID",
            "post_author",
            "post_date",
            "post_date_gmt",
            "post_content",
            "post_title",
            "post_excerpt",
            "post_status",
            "post_name",
            "post_modified",
            "post_modified_gmt",
            "post_parent",
            "post_type",
        ]),
        meta_table: "postmeta".into(),
        meta_foreign_key: "post_id".into(),
        date_fields: ["post_date", "post_date_gmt", "post_modified", "post_modified_gmt"]
            .into_iter()
            .map(|name| DateField {
                name: name.into(),
                default_now: false,
            })
            .collect(),
        specialization: Some(Specialization {
            field: "post_type".into(),
            variants: [("page".to_string(), "Page".into())].into_iter().collect(),
        }),
    };
    let page = EntitySchema {
        specialization: None,
        ..post.clone()
    };

    SchemaRegistry::new()
        .with("User", user)
        .with("Post", post)
        .with("Page", page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_schema_is_valid() {
        starter_schema().validate().expect("valid");
    }
}
