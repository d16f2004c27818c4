// legal-rag-core/src/main.rs
//
// Local smoke-test binary: loads a corpus directory, builds the retrieval
// core in-process and routes a single query from argv. No HTTP server —
// the generator/embedding/reranker base URLs in `RetrievalConfig` point at
// whatever external services the operator already has running.

#[cfg(feature = "cli")]
use std::collections::HashMap;
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
use legal_rag_core::{
    CorpusStore, EmbeddingProvider, HttpEmbeddingProvider, HttpGenerator, HttpReranker,
    Orchestrator, PassthroughReranker, QueryRequest, QueryResponse, Reranker, RetrievalConfig,
    Router, VectorIndex,
};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(about = "Route a single question against a local corpus, print the answer envelope")]
struct Args {
    /// The question to route.
    query: String,

    /// Reuse an existing session id instead of starting a fresh session.
    #[arg(long)]
    session_id: Option<String>,

    /// Override RetrievalConfig's CORPUS_ROOT for this invocation.
    #[arg(long)]
    corpus_root: Option<String>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    legal_rag_core::telemetry::init_tracing();

    let args = Args::parse();
    let mut config = RetrievalConfig::from_env()?;
    if let Some(root) = args.corpus_root {
        config.corpus_root = root;
    }

    let corpus = Arc::new(CorpusStore::load(&config.corpus_root)?);
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(HttpEmbeddingProvider::new(config.embedding_base_url.clone()));

    let mut chunks_by_collection = HashMap::new();
    let mut doc_titles_by_collection = HashMap::new();
    for collection in corpus.list_collections() {
        let documents = corpus.list_documents(&collection.id);
        let chunks: Vec<_> = documents.iter().flat_map(|doc| doc.chunks.clone()).collect();
        let titles: HashMap<_, _> = documents
            .iter()
            .map(|doc| (doc.doc_id.clone(), doc.title.clone()))
            .collect();
        chunks_by_collection.insert(collection.id.clone(), chunks);
        doc_titles_by_collection.insert(collection.id.clone(), titles);
    }
    let vector_index = Arc::new(VectorIndex::build_with_titles(
        chunks_by_collection,
        doc_titles_by_collection,
    ));
    let router = Arc::new(Router::build(corpus.clone(), embedder.clone()));

    let reranker: Arc<dyn Reranker> = if config.use_reranker {
        Arc::new(HttpReranker::new(config.reranker_base_url.clone()))
    } else {
        Arc::new(PassthroughReranker)
    };
    let generator = Arc::new(HttpGenerator::new(
        config.generator_base_url.clone(),
        std::time::Duration::from_secs(config.generator_timeout_seconds),
    ));

    let orchestrator = Orchestrator::new(
        corpus,
        router,
        vector_index,
        reranker,
        generator,
        embedder,
        config,
    );

    let response = orchestrator
        .handle_query(QueryRequest {
            query: args.query,
            session_id: args.session_id,
            max_tokens: None,
            temperature: None,
            top_k: None,
            pinned_filters: None,
        })
        .await;

    match response {
        QueryResponse::Answer {
            answer, session_id, ..
        } => {
            println!("[session {session_id}]\n{answer}");
        }
        QueryResponse::ClarificationNeeded {
            clarification,
            session_id,
            ..
        } => {
            println!("[session {session_id}] {}", clarification.message);
            for option in clarification.options {
                println!("  - {}: {}", option.id, option.title);
            }
        }
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
