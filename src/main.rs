//! kbstore CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use kbstore::{
    commands::{
        cmd_add_document, cmd_cache_prune, cmd_cache_stats, cmd_cancel_job,
        cmd_create_knowledge_base, cmd_delete_document, cmd_delete_knowledge_base,
        cmd_delete_model, cmd_init, cmd_list_access, cmd_list_chunks, cmd_list_documents,
        cmd_list_jobs, cmd_list_knowledge_bases, cmd_list_models, cmd_list_tags,
        cmd_rechunk_knowledge_base, cmd_refresh_statistics, cmd_register_model,
        cmd_restore_document, cmd_restore_knowledge_base, cmd_set_model_active,
        cmd_share_knowledge_base, cmd_show_job, cmd_show_knowledge_base,
        cmd_snapshot_knowledge_base, cmd_status, cmd_tag_knowledge_base,
        cmd_unshare_knowledge_base, cmd_untag_knowledge_base, cmd_update_knowledge_base,
        print_access_log, print_added_document, print_cache_prune_stats, print_cache_stats,
        print_chunks, print_documents, print_init, print_job, print_jobs,
        print_knowledge_base_completions, print_knowledge_base_details, print_knowledge_bases,
        print_models, print_rechunk_stats, print_stats, print_status, print_tags, print_versions,
        AddDocumentOptions, CreateKnowledgeBaseOptions, RegisterModelOptions,
        UpdateKnowledgeBaseOptions,
    },
    config::Config,
    db::Database,
    error::{Error, Result},
    lifecycle::ProcessingStatus,
    models::Provider,
    progress::LogWriterFactory,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kbstore")]
#[command(version, about = "Knowledge base, chunk and embedding store for RAG backends", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize kbstore configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show system status
    Status,

    /// Manage knowledge bases
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Manage documents and their chunks
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Manage the embedding model registry
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Inspect and cancel embedding jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Inspect and prune the query embedding cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// Create a knowledge base
    Create {
        /// Display name
        name: String,

        /// Owning user
        #[arg(long, env = "KBSTORE_USER")]
        owner: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Embedding model name (defaults to config)
        #[arg(long)]
        model: Option<String>,

        /// Embedding dimension (defaults to config)
        #[arg(long)]
        dimension: Option<i64>,

        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<i64>,

        /// Overlap between chunks in characters
        #[arg(long)]
        chunk_overlap: Option<i64>,

        /// Readable by everyone
        #[arg(long)]
        public: bool,
    },

    /// List knowledge bases
    List {
        /// Only knowledge bases this user may read
        #[arg(long)]
        user: Option<String>,

        /// Include soft-deleted knowledge bases
        #[arg(long)]
        all: bool,

        /// Output only IDs (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,

        /// Output IDs with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Show a knowledge base with its shares, tags and versions
    Show {
        id: String,

        /// Viewing user, recorded in the access log
        #[arg(long, env = "KBSTORE_USER")]
        user: Option<String>,
    },

    /// Change name, description, chunking or visibility
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        chunk_size: Option<i64>,

        #[arg(long)]
        chunk_overlap: Option<i64>,

        /// Set public visibility
        #[arg(long)]
        public: Option<bool>,
    },

    /// Recompute document, chunk and token statistics
    Stats { id: String },

    /// Delete a knowledge base (soft by default)
    Delete {
        id: String,

        /// Remove rows and stored files permanently
        #[arg(long)]
        hard: bool,
    },

    /// Restore a soft-deleted knowledge base
    Restore { id: String },

    /// Grant a user read access
    Share { id: String, user: String },

    /// Revoke a user's read access
    Unshare { id: String, user: String },

    /// Record a version snapshot of the current counters
    Snapshot {
        id: String,

        /// Description of what changed
        #[arg(long, default_value = "")]
        changes: String,

        /// User creating the snapshot
        #[arg(long, env = "KBSTORE_USER")]
        by: Option<String>,
    },

    /// List version snapshots
    Versions { id: String },

    /// Re-split every document with the current chunk settings
    Rechunk { id: String },

    /// Attach a tag, creating it if needed
    Tag {
        id: String,
        tag: String,

        /// Hex color for a new tag (#rrggbb)
        #[arg(long)]
        color: Option<String>,
    },

    /// Detach a tag
    Untag { id: String, tag: String },

    /// List tags of a knowledge base, or all tags
    Tags { id: Option<String> },

    /// Show recent access log entries
    Access {
        id: String,

        /// Maximum entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum DocAction {
    /// Add a local file as a document
    Add {
        /// Knowledge base ID
        kb: String,

        /// File to add
        path: PathBuf,

        /// Title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Uploading user
        #[arg(long, env = "KBSTORE_USER")]
        by: Option<String>,
    },

    /// List documents of a knowledge base
    List {
        /// Knowledge base ID
        kb: String,

        /// Include soft-deleted documents
        #[arg(long)]
        all: bool,
    },

    /// List a document's chunks
    Chunks {
        /// Document ID
        id: String,

        /// Preview length in characters
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Delete a document (soft by default)
    Delete {
        id: String,

        /// Remove rows and the stored file permanently
        #[arg(long)]
        hard: bool,
    },

    /// Restore a soft-deleted document
    Restore { id: String },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Register an embedding model
    Register {
        /// Unique model name
        name: String,

        /// Vector dimension
        #[arg(long)]
        dimension: i64,

        /// ollama, openai, huggingface or sentence_transformers
        #[arg(long, default_value = "ollama")]
        provider: Provider,

        /// Provider-side model identifier (defaults to the name)
        #[arg(long)]
        model_id: Option<String>,

        #[arg(long)]
        max_tokens: Option<i64>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List registered models
    List {
        /// Only active models
        #[arg(long)]
        active: bool,
    },

    /// Mark a model active
    Enable { name: String },

    /// Mark a model inactive
    Disable { name: String },

    /// Delete an unreferenced model
    Delete { name: String },
}

#[derive(Subcommand)]
enum JobAction {
    /// List embedding jobs
    List {
        /// pending, processing, completed, failed or cancelled
        #[arg(long)]
        status: Option<ProcessingStatus>,
    },

    /// Show one job
    Show { id: String },

    /// Cancel a pending or running job
    Cancel {
        id: String,

        #[arg(long, default_value = "cancelled by user")]
        reason: String,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache size and hits
    Stats,

    /// Evict least recently used entries
    Prune {
        /// Entries to keep (defaults to query_cache.max_entries)
        #[arg(long)]
        max_entries: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().map(config_base_dir);
        let result = cmd_init(base_dir, force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_init(&result);
        }
        return Ok(());
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "kbstore", &mut std::io::stdout());
        print_completion_extras(shell);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = Database::connect(&config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }

    let json = cli.json;
    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Kb { action } => handle_kb(&config, &db, action, json).await?,
        Commands::Doc { action } => handle_doc(&config, &db, action, json).await?,
        Commands::Model { action } => handle_model(&db, action, json).await?,
        Commands::Job { action } => handle_job(&db, action, json).await?,

        Commands::Cache { action } => match action {
            CacheAction::Stats => {
                let stats = cmd_cache_stats(&db).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print_cache_stats(&stats);
                }
            }
            CacheAction::Prune { max_entries } => {
                let stats = cmd_cache_prune(&config, &db, max_entries).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print_cache_prune_stats(&stats);
                }
            }
        },
    }

    Ok(())
}

async fn handle_kb(config: &Config, db: &Database, action: KbAction, json: bool) -> Result<()> {
    match action {
        KbAction::Create {
            name,
            owner,
            description,
            model,
            dimension,
            chunk_size,
            chunk_overlap,
            public,
        } => {
            let options = CreateKnowledgeBaseOptions {
                owner_id: owner,
                name,
                description,
                embedding_model: model,
                embedding_dimension: dimension,
                chunk_size,
                chunk_overlap,
                is_public: public,
            };
            let kb = cmd_create_knowledge_base(config, db, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kb)?);
            } else {
                println!("✓ Created knowledge base '{}'", kb.name);
                println!("  ID: {}", kb.id);
            }
        }

        KbAction::List {
            user,
            all,
            ids_only,
            completion,
        } => {
            let kbs = cmd_list_knowledge_bases(db, user.as_deref(), all).await?;
            if let Some(shell) = completion {
                print_knowledge_base_completions(&kbs, shell);
            } else if ids_only {
                for kb in &kbs {
                    println!("{}", kb.id);
                }
            } else if json {
                println!("{}", serde_json::to_string_pretty(&kbs)?);
            } else {
                print_knowledge_bases(&kbs);
            }
        }

        KbAction::Show { id, user } => {
            let details = cmd_show_knowledge_base(db, &id, user.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_knowledge_base_details(&details);
            }
        }

        KbAction::Update {
            id,
            name,
            description,
            chunk_size,
            chunk_overlap,
            public,
        } => {
            let options = UpdateKnowledgeBaseOptions {
                name,
                description,
                chunk_size,
                chunk_overlap,
                is_public: public,
            };
            let kb = cmd_update_knowledge_base(db, &id, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kb)?);
            } else {
                println!("✓ Updated knowledge base '{}'", kb.name);
            }
        }

        KbAction::Stats { id } => {
            let stats = cmd_refresh_statistics(db, &id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("✓ Statistics refreshed");
                print_stats(&stats);
            }
        }

        KbAction::Delete { id, hard } => {
            cmd_delete_knowledge_base(config, db, &id, hard).await?;
            let kind = if hard { "permanently deleted" } else { "deleted" };
            print_ok(json, &format!("Knowledge base '{}' {}", id, kind));
        }

        KbAction::Restore { id } => {
            let kb = cmd_restore_knowledge_base(db, &id).await?;
            print_ok(json, &format!("Knowledge base '{}' restored", kb.name));
        }

        KbAction::Share { id, user } => {
            let shares = cmd_share_knowledge_base(db, &id, &user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&shares)?);
            } else {
                println!("✓ Shared with {}", user);
                println!("  Shared with: {}", shares.join(", "));
            }
        }

        KbAction::Unshare { id, user } => {
            let removed = cmd_unshare_knowledge_base(db, &id, &user).await?;
            if removed {
                print_ok(json, &format!("Access for {} revoked", user));
            } else {
                print_ok(json, &format!("{} had no share", user));
            }
        }

        KbAction::Snapshot { id, changes, by } => {
            let version = cmd_snapshot_knowledge_base(db, &id, &changes, by.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&version)?);
            } else {
                println!("✓ Recorded version {}", version.version);
            }
        }

        KbAction::Versions { id } => {
            let details = cmd_show_knowledge_base(db, &id, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details.versions)?);
            } else if details.versions.is_empty() {
                println!("No versions recorded.");
            } else {
                print_versions(&details.versions);
            }
        }

        KbAction::Rechunk { id } => {
            let stats = cmd_rechunk_knowledge_base(db, &id, !json).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_rechunk_stats(&stats);
            }
        }

        KbAction::Tag { id, tag, color } => {
            let tags = cmd_tag_knowledge_base(db, &id, &tag, color.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                println!("✓ Tagged with {}", tag);
                print_tags(&tags);
            }
        }

        KbAction::Untag { id, tag } => {
            if cmd_untag_knowledge_base(db, &id, &tag).await? {
                print_ok(json, &format!("Tag {} removed", tag));
            } else {
                print_ok(json, &format!("Tag {} was not attached", tag));
            }
        }

        KbAction::Tags { id } => {
            let tags = cmd_list_tags(db, id.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                print_tags(&tags);
            }
        }

        KbAction::Access { id, limit } => {
            let entries = cmd_list_access(db, &id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_access_log(&entries);
            }
        }
    }

    Ok(())
}

async fn handle_doc(config: &Config, db: &Database, action: DocAction, json: bool) -> Result<()> {
    match action {
        DocAction::Add { kb, path, title, by } => {
            let options = AddDocumentOptions {
                title,
                uploaded_by: by,
            };
            let added = cmd_add_document(config, db, &kb, &path, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&added)?);
            } else {
                print_added_document(&added);
            }
        }

        DocAction::List { kb, all } => {
            let docs = cmd_list_documents(db, &kb, all).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else {
                print_documents(&docs);
            }
        }

        DocAction::Chunks { id, preview } => {
            let chunks = cmd_list_chunks(db, &id, preview).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                print_chunks(&chunks);
            }
        }

        DocAction::Delete { id, hard } => {
            cmd_delete_document(config, db, &id, hard).await?;
            let kind = if hard { "permanently deleted" } else { "deleted" };
            print_ok(json, &format!("Document '{}' {}", id, kind));
        }

        DocAction::Restore { id } => {
            let doc = cmd_restore_document(db, &id).await?;
            print_ok(json, &format!("Document '{}' restored", doc.title));
        }
    }

    Ok(())
}

async fn handle_model(db: &Database, action: ModelAction, json: bool) -> Result<()> {
    match action {
        ModelAction::Register {
            name,
            dimension,
            provider,
            model_id,
            max_tokens,
            description,
        } => {
            let options = RegisterModelOptions {
                name,
                provider,
                dimension,
                model_id,
                max_tokens,
                description,
            };
            let model = cmd_register_model(db, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
            } else {
                println!("✓ Registered model '{}' ({} dims)", model.name, model.dimension);
                println!("  ID: {}", model.id);
            }
        }

        ModelAction::List { active } => {
            let models = cmd_list_models(db, active).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                print_models(&models);
            }
        }

        ModelAction::Enable { name } => {
            let model = cmd_set_model_active(db, &name, true).await?;
            print_ok(json, &format!("Model '{}' enabled", model.name));
        }

        ModelAction::Disable { name } => {
            let model = cmd_set_model_active(db, &name, false).await?;
            print_ok(json, &format!("Model '{}' disabled", model.name));
        }

        ModelAction::Delete { name } => {
            let model = cmd_delete_model(db, &name).await?;
            print_ok(json, &format!("Model '{}' deleted", model.name));
        }
    }

    Ok(())
}

async fn handle_job(db: &Database, action: JobAction, json: bool) -> Result<()> {
    match action {
        JobAction::List { status } => {
            let jobs = cmd_list_jobs(db, status).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print_jobs(&jobs);
            }
        }

        JobAction::Show { id } => {
            let info = cmd_show_job(db, &id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_job(&info);
            }
        }

        JobAction::Cancel { id, reason } => {
            let info = cmd_cancel_job(db, &id, &reason).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("✓ Job {} cancelled", info.job.id);
            }
        }
    }

    Ok(())
}

fn print_ok(json: bool, message: &str) {
    if json {
        println!("{}", serde_json::json!({ "status": "ok", "message": message }));
    } else {
        println!("✓ {}", message);
    }
}

fn print_completion_extras(shell: Shell) {
    match shell {
        Shell::Zsh => {
            println!();
            println!("{}", r#"# Dynamic completion for knowledge base IDs"#);
            println!("{}", r#"_kbstore_kb_ids() {"#);
            println!("{}", r#"    local -a entries"#);
            println!(
                "{}",
                r#"    entries=("${(@f)$(kbstore kb list --completion zsh 2>/dev/null)}")"#
            );
            println!("{}", r#"    _describe -t knowledge-bases 'knowledge base ids' entries"#);
            println!("{}", r#"}"#);
        }
        Shell::Fish => {
            println!();
            println!("{}", r#"# Dynamic completion for knowledge base IDs"#);
            for sub in ["show", "update", "stats", "delete", "restore", "rechunk", "versions"] {
                println!(
                    "complete -c kbstore -n '__fish_seen_subcommand_from kb; and __fish_seen_subcommand_from {}' -a '(kbstore kb list --completion fish 2>/dev/null)'",
                    sub
                );
            }
        }
        _ => {}
    }
}

/// `--config` may name a .toml file or the directory holding it
fn config_base_dir(path: &std::path::Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(p) => p.join("config.toml"),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'kbstore init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
