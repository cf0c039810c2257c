//! SiteTree administration CLI.
//!
//! Maintains workspace files (JSON snapshots of a content store) and
//! imports site definitions through the mapper.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sitetree_core::archive;
use sitetree_core::{ContentSession, Mapper, MemoryStore, SiteRef};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sitetree-admin")]
#[command(version = "0.1.0")]
#[command(about = "Site tree workspace administration tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a workspace file with empty sites
    Init {
        /// Workspace file to create
        workspace: PathBuf,

        /// Sites to create, as type/name (e.g. portal/classic)
        #[arg(short, long)]
        site: Vec<String>,
    },

    /// Import a site definition and print the applied changes
    Apply {
        /// Workspace file
        #[arg(short, long)]
        workspace: PathBuf,

        /// Site definition JSON
        #[arg(short, long)]
        definition: PathBuf,
    },

    /// Print a site's portal model as JSON
    Show {
        /// Workspace file
        #[arg(short, long)]
        workspace: PathBuf,

        /// Site as type/name
        #[arg(short, long)]
        site: String,
    },

    /// List stored page names of a site
    Pages {
        /// Workspace file
        #[arg(short, long)]
        workspace: PathBuf,

        /// Site as type/name
        #[arg(short, long)]
        site: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { workspace, site } => cmd_init(workspace, site),
        Commands::Apply {
            workspace,
            definition,
        } => cmd_apply(workspace, definition),
        Commands::Show { workspace, site } => cmd_show(workspace, site),
        Commands::Pages { workspace, site } => cmd_pages(workspace, site),
    }
}

fn cmd_init(workspace: PathBuf, sites: Vec<String>) -> Result<()> {
    if workspace.exists() {
        bail!("workspace {} already exists", workspace.display());
    }

    let mut store = MemoryStore::new();
    for raw in &sites {
        let site: SiteRef = raw.parse()?;
        store.create_site(&site);
        println!("created {}", site);
    }

    archive::save_store(&workspace, &store)?;
    println!("workspace written to {}", workspace.display());
    Ok(())
}

fn cmd_apply(workspace: PathBuf, definition: PathBuf) -> Result<()> {
    let mut store = archive::load_store(&workspace)?;
    let def = archive::load_site_definition(&definition)?;

    let site = def.portal.site.clone();
    store.create_site(&site);

    let mut mapper = Mapper::new(&mut store);
    let mut changes = mapper.save_portal(&def.portal)?;
    for page in &def.pages {
        changes.extend(mapper.save_page(page)?);
    }
    if let Some(navigation) = &def.navigation {
        changes.extend(mapper.save_navigation(navigation)?);
    }

    for change in &changes {
        println!("{}", change);
    }
    info!("applied {} with {} changes", site, changes.len());

    archive::save_store(&workspace, &store)?;
    Ok(())
}

fn cmd_show(workspace: PathBuf, site: String) -> Result<()> {
    let mut store = archive::load_store(&workspace)?;
    let site: SiteRef = site.parse()?;

    let mapper = Mapper::new(&mut store);
    let portal = mapper.load_portal(&site)?;
    println!("{}", serde_json::to_string_pretty(&portal)?);
    Ok(())
}

fn cmd_pages(workspace: PathBuf, site: String) -> Result<()> {
    let store = archive::load_store(&workspace)?;
    let site: SiteRef = site.parse()?;

    let node = store
        .find_site(&site)
        .with_context(|| format!("no such site: {}", site))?;
    for name in store.page_names(&node) {
        println!("{}", name);
    }
    Ok(())
}
