//! `docqa`: ingest one file or web page, then answer questions about it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use docqa_rag::config::DEFAULT_INDEX_PATH;
use docqa_rag::openai::{DEFAULT_CHAT_MODEL, OpenAIEmbeddingProvider, OpenAIGenerator};
use docqa_rag::{
    EmbeddingProvider, ErrorReport, Generator, HashingEmbeddingProvider, RagConfig, RagError,
    RagPipeline, Source,
};
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Ask questions about a document or web page")]
struct Cli {
    /// Text, Markdown or PDF file to ingest
    #[arg(long)]
    file: Option<PathBuf>,

    /// Web page to ingest
    #[arg(long)]
    url: Option<String>,

    /// Question to answer; repeat for several. Without any, an interactive prompt opens
    #[arg(long = "question", short = 'q')]
    questions: Vec<String>,

    /// Maximum segment length in characters
    #[arg(long, env = "DOCQA_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Characters shared by consecutive segments
    #[arg(long, env = "DOCQA_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Segments retrieved per question
    #[arg(long, env = "DOCQA_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Where the vector index is written after ingestion
    #[arg(long, env = "DOCQA_INDEX_PATH", default_value = DEFAULT_INDEX_PATH)]
    index_path: PathBuf,

    /// Keep the index in memory only
    #[arg(long, default_value_t = false)]
    no_persist: bool,

    /// Embedding backend
    #[arg(long, env = "DOCQA_EMBEDDER", value_enum, default_value_t = EmbedderKind::Hashing)]
    embedder: EmbedderKind,

    /// OpenAI chat model used for answers
    #[arg(long, env = "DOCQA_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Print the retrieved segments instead of calling the language model
    #[arg(long, default_value_t = false)]
    retrieve_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Local feature-hashing embeddings; no network access
    Hashing,
    /// OpenAI embeddings API; needs OPENAI_API_KEY
    Openai,
}

impl Cli {
    fn rag_config(&self) -> docqa_rag::Result<RagConfig> {
        let builder = RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k);
        let builder = if self.no_persist {
            builder.no_persistence()
        } else {
            builder.index_path(&self.index_path)
        };
        builder.build()
    }

    fn embedding_provider(&self) -> docqa_rag::Result<Arc<dyn EmbeddingProvider>> {
        Ok(match self.embedder {
            EmbedderKind::Hashing => Arc::new(HashingEmbeddingProvider::default()),
            EmbedderKind::Openai => Arc::new(OpenAIEmbeddingProvider::from_env()?),
        })
    }

    fn generator(&self) -> docqa_rag::Result<Arc<dyn Generator>> {
        if self.retrieve_only {
            return Ok(Arc::new(RetrievalOnly));
        }
        Ok(Arc::new(OpenAIGenerator::from_env()?.with_model(&self.model)))
    }
}

/// Stands in for the language model under `--retrieve-only`.
struct RetrievalOnly;

#[async_trait]
impl Generator for RetrievalOnly {
    async fn generate(&self, _prompt: &str) -> docqa_rag::Result<String> {
        Err(RagError::Generation {
            provider: self.name().to_string(),
            message: "language model disabled by --retrieve-only".to_string(),
        })
    }

    fn name(&self) -> &str {
        "retrieve-only"
    }
}

async fn read_source(file: Option<&Path>, url: Option<String>) -> anyhow::Result<Source> {
    let file = match file {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.map_err(RagError::from)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Some((name, bytes))
        }
        None => None,
    };
    Ok(Source::from_parts(file, url)?)
}

async fn ask(pipeline: &RagPipeline, question: &str, retrieve_only: bool) -> docqa_rag::Result<()> {
    if retrieve_only {
        for hit in pipeline.retrieve(question).await? {
            println!("[segment {} | distance {:.4}]", hit.segment.id, hit.distance);
            println!("{}\n", hit.segment.text.trim());
        }
    } else {
        println!("{}", pipeline.answer(question).await?.answer);
    }
    Ok(())
}

fn report(err: &anyhow::Error) {
    let json = match err.downcast_ref::<RagError>() {
        Some(rag) => serde_json::to_string(&ErrorReport::from(rag)),
        None => serde_json::to_string(&serde_json::json!({
            "kind": "internal",
            "message": format!("{err:#}"),
        })),
    };
    match json {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{err:#}"),
    }
}

fn repl(pipeline: &RagPipeline, retrieve_only: bool) -> anyhow::Result<()> {
    let mut editor = rustyline::DefaultEditor::new().context("failed to open interactive prompt")?;
    let runtime = tokio::runtime::Handle::current();

    loop {
        let line = match editor.readline("question> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }
        let _ = editor.add_history_entry(question);

        if let Err(e) = runtime.block_on(ask(pipeline, question, retrieve_only)) {
            report(&anyhow::Error::from(e));
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let source = read_source(cli.file.as_deref(), cli.url.clone()).await?;

    let pipeline = RagPipeline::builder()
        .config(cli.rag_config()?)
        .embedding_provider(cli.embedding_provider()?)
        .generator(cli.generator()?)
        .build()?;

    let ingested = pipeline.ingest(source).await?;
    println!("Ingested {} ({} segments)", ingested.source_name, ingested.segment_count);

    if cli.questions.is_empty() {
        let retrieve_only = cli.retrieve_only;
        return tokio::task::block_in_place(|| repl(&pipeline, retrieve_only));
    }

    for question in &cli.questions {
        ask(&pipeline, question, cli.retrieve_only).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "docqa failed");
            report(&e);
            ExitCode::FAILURE
        }
    }
}
