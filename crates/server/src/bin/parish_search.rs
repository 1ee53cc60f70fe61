//! Run the fusion retriever from the command line and print the fused ranking.

use std::sync::Arc;

use clap::Parser;

use parish_chat_config::{load_settings, Settings};
use parish_chat_core::LanguageModel;
use parish_chat_llm::{ClaudeBackend, ClaudeConfig, OpenAiBackend, OpenAiConfig, OpenAiEmbedder};
use parish_chat_rag::{FusionRetriever, QdrantIndex, RetrieverConfig, VectorStoreConfig};
use parish_chat_server::build_retriever;

#[derive(Parser)]
#[command(name = "parish-search")]
#[command(about = "Search the parish documents with query expansion and rank fusion")]
struct Args {
    /// Question to search for
    #[arg(required = true)]
    query: Vec<String>,

    /// Configuration environment (config/{env}.yaml)
    #[arg(short, long)]
    env: Option<String>,

    /// Passages to print
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Search the query as-is, without paraphrases
    #[arg(long)]
    no_expand: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parish_chat=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config: Settings = load_settings(args.env.as_deref())?;
    if let Some(top_k) = args.top_k {
        config.rag.final_top_k = top_k;
    }

    let embedder = Arc::new(OpenAiEmbedder::new(&config.llm, config.rag.vector_dim)?);
    let index = Arc::new(QdrantIndex::new(VectorStoreConfig::from(&config.rag))?);

    let retriever = if args.no_expand {
        FusionRetriever::new(embedder, index, RetrieverConfig::from(&config.rag))
    } else {
        let auxiliary: Arc<dyn LanguageModel> = if config.llm.anthropic_api_key.is_empty() {
            Arc::new(OpenAiBackend::new(OpenAiConfig::from_settings(&config.llm))?)
        } else {
            Arc::new(ClaudeBackend::new(ClaudeConfig::from_settings(&config.llm))?)
        };
        build_retriever(&config.rag, embedder, index, auxiliary)
    };

    let query = args.query.join(" ");
    let report = retriever.retrieve(&query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Queries:");
    for q in &report.queries {
        println!("  - {}", q);
    }
    println!(
        "{} candidates fused, {} above the relevance floor, {} failed branches",
        report.fused_count,
        report.passages.len(),
        report.failed_branches
    );

    for (rank, passage) in report.passages.iter().enumerate() {
        println!(
            "\n#{} {} (similarity {:.3}, rrf {:.4}, hits {})",
            rank + 1,
            passage.id,
            passage.similarity,
            passage.rrf_score,
            passage.hits
        );
        println!("{}", passage.text);
    }

    Ok(())
}
