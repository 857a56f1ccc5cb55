//! CLI subcommands — the second transport over the same command
//! implementations `http.rs` exposes over HTTP.

use clap::Subcommand;

use usc_manager::DiscoveredUniverse;
use usc_types::{RepoHost, RepoRef};

use crate::commands::{self, *};
use crate::state::AppState;

/// One CLI subcommand per named command in `commands.rs`.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP command surface and status stream.
    Serve,
    /// `get_all_universes`.
    List,
    /// `get_active_universe`.
    Active,
    /// `get_auth_status`.
    AuthStatus,
    /// `switch_active`.
    Switch {
        /// Universe slug to activate.
        slug: String,
        /// Save the outgoing universe first.
        #[arg(long)]
        save_current: bool,
    },
    /// `create_universe`.
    Create {
        /// Display name.
        name: String,
        /// `owner/repo` to link on GitHub immediately, if any.
        #[arg(long)]
        github_repo: Option<String>,
        /// Enable the local file backing.
        #[arg(long)]
        local_file: bool,
    },
    /// `delete_universe`.
    Delete {
        /// Universe slug to remove.
        slug: String,
    },
    /// `update_universe` (name only, from the CLI).
    Rename {
        /// Universe slug to rename.
        slug: String,
        /// New display name.
        name: String,
    },
    /// `discover_in_repo` against a GitHub repo.
    Discover {
        /// `owner/repo` to walk.
        github_repo: String,
    },
    /// `resolve_sync_conflict`.
    ResolveConflict {
        /// Universe slug whose conflict should be resolved.
        slug: String,
    },
}

fn parse_owner_repo(spec: &str) -> anyhow::Result<RepoRef> {
    let (owner, repo) = spec
        .split_once('/')
        .ok_or_else(|| anyhow::anyhow!("expected owner/repo, got {spec:?}"))?;
    Ok(RepoRef {
        host: RepoHost::GitHub,
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Dispatch one CLI invocation against an already-constructed [`AppState`].
pub async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve => unreachable!("handled in main before run() is called"),
        Commands::List => {
            for universe in commands::get_all_universes(state) {
                println!(
                    "{}\t{}\tsource_of_truth={:?}",
                    universe.slug, universe.name, universe.source_of_truth
                );
            }
        }
        Commands::Active => match commands::get_active_universe(state) {
            Some(universe) => println!("{} ({})", universe.slug, universe.name),
            None => println!("no active universe"),
        },
        Commands::AuthStatus => {
            let status = commands::get_auth_status(state).await;
            print_modality_status("oauth", &status.oauth);
            print_modality_status("app_installation", &status.app_installation);
        }
        Commands::Switch { slug, save_current } => {
            let outcome = commands::switch_active(
                state,
                SwitchActivePayload { slug: slug.clone(), save_current },
            )
            .await?;
            println!(
                "switched to {slug}, node_count={}",
                outcome.store_state.prototypes.len()
            );
        }
        Commands::Create { name, github_repo, local_file } => {
            let linked_repo = github_repo.as_deref().map(parse_owner_repo).transpose()?;
            let universe = commands::create_universe(
                state,
                CreateUniversePayload {
                    name,
                    source_of_truth: None,
                    linked_repo,
                    enable_local_file: local_file,
                    create_remote_repo_private: None,
                },
            )
            .await?;
            println!("created {} ({})", universe.slug, universe.name);
        }
        Commands::Delete { slug } => {
            commands::delete_universe(state, DeleteUniversePayload { slug: slug.clone() }).await?;
            println!("deleted {slug}");
        }
        Commands::Rename { slug, name } => {
            let universe = commands::update_universe(
                state,
                UpdateUniversePayload {
                    slug: slug.clone(),
                    name: Some(name),
                    source_of_truth: None,
                    local_file_enabled: None,
                },
            )
            .await?;
            println!("renamed {} to {}", universe.slug, universe.name);
        }
        Commands::Discover { github_repo } => {
            let repo = parse_owner_repo(&github_repo)?;
            let discovered = commands::discover_in_repo(state, DiscoverInRepoPayload { repo }).await?;
            for d in discovered {
                print_discovered(&d);
            }
        }
        Commands::ResolveConflict { slug } => {
            let state_after = commands::resolve_sync_conflict(
                state,
                ResolveSyncConflictPayload { slug: slug.clone() },
            )
            .await?;
            println!(
                "{slug} resolved, node_count={}",
                state_after.prototypes.len()
            );
        }
    }
    Ok(())
}

fn print_modality_status(label: &str, status: &ModalityStatus) {
    match &status.health {
        Some(health) => println!("{label}: connected={} health={:?}", status.connected, health),
        None => println!("{label}: no credential stored"),
    }
}

fn print_discovered(d: &DiscoveredUniverse) {
    println!(
        "{}\t{}\tnode_count={} graph_count={}",
        d.slug, d.name, d.stats.node_count, d.stats.graph_count
    );
}
