use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_qa_core::{
    build_gateway, discover_pdf_files, AppConfig, Chatbot, Collection, CollectionPolicy,
    ExpansionOptions, IngestMode, IngestionOptions, LlmConfig, QdrantConfig, RetrievalOptions,
    RetryPolicy, SynthesisOptions, UploadedPdf,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FAILURE_BANNER: &str = "Something went wrong. Check the logs and try again.";

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = pdf_qa_core::config::DEFAULT_QDRANT_URL)]
    qdrant_url: String,

    /// Google Generative Language API key
    #[arg(long, env = "GOOGLE_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Chat model used for expansion, summaries and answers
    #[arg(long, env = "PDF_QA_CHAT_MODEL", default_value = pdf_qa_core::config::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Embedding model
    #[arg(long, env = "PDF_QA_EMBEDDING_MODEL", default_value = pdf_qa_core::config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chunk size in characters.
    #[arg(long, env = "PDF_QA_CHUNK_SIZE", default_value = "500")]
    chunk_size: usize,

    /// Characters shared by neighbouring chunks.
    #[arg(long, env = "PDF_QA_CHUNK_OVERLAP", default_value = "50")]
    chunk_overlap: usize,

    /// Results per collection search.
    #[arg(long, env = "PDF_QA_SEARCH_LIMIT", default_value = "10")]
    search_limit: usize,

    /// Alternative phrasings generated per question.
    #[arg(long, env = "PDF_QA_VARIANTS", default_value = "2")]
    variants: usize,

    /// Attempts per upstream call, 1 disables retries.
    #[arg(long, env = "PDF_QA_RETRY_ATTEMPTS", default_value = "2")]
    retry_attempts: u32,

    /// What to do when a collection is missing.
    #[arg(long, value_enum, default_value_t = PolicyArg::PerCollection)]
    collection_policy: PolicyArg,

    /// Embed locally instead of calling the embedding API.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question against the ingested PDFs.
    Ask {
        #[arg(long)]
        question: String,
        /// Print the retrieved passages after the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Summarize, chunk and store PDFs.
    Ingest {
        /// PDF file, repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Abort on the first failing file.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// Check connectivity and make sure all collections exist.
    Collections {
        /// Drop and recreate all collections. Deletes stored vectors.
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    PerCollection,
    RecreateAll,
}

impl From<PolicyArg> for CollectionPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::PerCollection => CollectionPolicy::PerCollection,
            PolicyArg::RecreateAll => CollectionPolicy::RecreateAll,
        }
    }
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            qdrant: QdrantConfig {
                url: self.qdrant_url.clone(),
                ..QdrantConfig::default()
            },
            llm: LlmConfig {
                api_key: self.api_key.clone(),
                chat_model: self.chat_model.clone(),
                embedding_model: self.embedding_model.clone(),
                ..LlmConfig::default()
            },
            ingestion: IngestionOptions {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                ..IngestionOptions::default()
            },
            retrieval: RetrievalOptions {
                search_limit: self.search_limit,
            },
            expansion: ExpansionOptions {
                variants: self.variants,
            },
            synthesis: SynthesisOptions::default(),
            collection_policy: self.collection_policy.into(),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa boot"
    );

    if let Err(error) = run(cli).await {
        error!(error = %format!("{error:#}"), "command failed");
        eprintln!("{FAILURE_BANNER}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.app_config();
    let needs_api_key = !matches!(cli.command, Command::Collections { .. }) || !cli.offline;
    config.validate(needs_api_key)?;

    match cli.command {
        Command::Ask {
            question,
            show_context,
        } => {
            let chatbot = Chatbot::from_config(&config, cli.offline)?;
            chatbot.connect().await?;
            let reply = chatbot.answer(&question).await?;

            info!(variants = ?reply.expanded, "expanded question");
            println!("{}", reply.answer);

            if show_context {
                for bundle in &reply.context {
                    println!("\nquestion: {}", bundle.question);
                    for (collection, documents) in &bundle.buckets {
                        for document in documents {
                            println!(
                                "[{collection}] score={:.4} {}",
                                document.metadata.score.unwrap_or_default(),
                                document.content
                            );
                        }
                    }
                }
            }
        }
        Command::Ingest {
            mut files,
            folder,
            fail_fast,
        } => {
            if let Some(folder) = &folder {
                files.extend(discover_pdf_files(folder));
            }
            if files.is_empty() {
                anyhow::bail!("no pdf files given; use --file or --folder");
            }

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadedPdf::from_path(path).await?);
            }

            let chatbot = Chatbot::from_config(&config, cli.offline)?;
            chatbot.connect().await?;
            let mode = if fail_fast {
                IngestMode::FailFast
            } else {
                IngestMode::BestEffort
            };
            let report = chatbot.ingest(&uploads, mode).await?;

            for skipped in &report.skipped_files {
                warn!(file = %skipped.file_name, reason = %skipped.reason, "skipped pdf");
            }
            for stored in &report.stored {
                println!(
                    "{} pages={} chunks={} sha256={}",
                    stored.file_name,
                    stored.page_ids.len(),
                    stored.chunk_ids.len(),
                    stored.checksum
                );
            }
            println!(
                "{} of {} pdf(s) ingested at {}",
                report.stored.len(),
                uploads.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Collections { recreate } => {
            let gateway = build_gateway(&config, cli.offline)?;
            gateway.connect().await?;

            if recreate {
                let dimensions = gateway.ensure_collections().await?;
                println!("recreated all collections with {dimensions} dimensions");
            } else {
                for collection in Collection::ALL {
                    let info = gateway.check_collection(collection).await?;
                    println!(
                        "{collection}: dimensions={} distance={}",
                        info.dimensions,
                        info.distance.as_str()
                    );
                }
            }
        }
    }

    Ok(())
}
