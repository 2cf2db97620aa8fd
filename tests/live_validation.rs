use std::env;

use rustycounsel::{
    config::LlmProvider,
    embedding::{EmbeddingClient, GeminiEmbeddingClient, OllamaEmbeddingClient},
    query::{ChatClient, LlmProviderError, OpenAiCompatibleChatClient},
    qdrant::QdrantService,
};

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_collection_roundtrip() {
    let url = env_or("QDRANT_URL", "http://127.0.0.1:6333");
    let service = QdrantService::new(&url, env::var("QDRANT_API_KEY").ok()).expect("client");
    let collection = "rusty-counsel-live-check";

    service
        .create_collection_if_not_exists(collection, 4)
        .await
        .expect("create collection");
    assert!(
        service.collection_exists(collection).await.expect("lookup"),
        "collection should exist after creation"
    );
    assert_eq!(service.count_points(collection).await.expect("count"), 0);
    service
        .delete_collection(collection)
        .await
        .expect("delete collection");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    let model = env_or("OLLAMA_EMBED_MODEL", "nomic-embed-text");
    let client = OllamaEmbeddingClient::new(&model, env::var("OLLAMA_URL").ok()).expect("client");
    let vectors = client
        .embed_batch(vec![
            "Everyone has the right to education.".to_string(),
            "No one shall be subjected to torture.".to_string(),
        ])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 2, "expected embedding per input text");
    assert_eq!(vectors[0].len(), vectors[1].len(), "dimension mismatch");

    let single = client
        .embed_one("Everyone has the right to education.")
        .await
        .expect("single embedding");
    assert_eq!(single.len(), vectors[0].len());
}

#[tokio::test]
#[ignore = "Requires GEMINI_API_KEY"]
async fn live_gemini_embedding_dimension() {
    let api_key = env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let client =
        GeminiEmbeddingClient::new("models/text-embedding-004", &api_key, None).expect("client");
    let vector = client
        .embed_one("Right to a fair trial")
        .await
        .expect("gemini embedding");
    assert_eq!(vector.len(), 768);
}

#[tokio::test]
#[ignore = "Requires GROQ_API_KEY"]
async fn live_groq_completion_and_auth_diagnostics() {
    let api_key = env::var("GROQ_API_KEY").expect("GROQ_API_KEY must be set");
    let model = env_or("GROQ_MODEL", "llama-3.3-70b-versatile");
    let client =
        OpenAiCompatibleChatClient::new(LlmProvider::Groq, &model, &api_key, None, 0.0)
            .expect("client");
    let answer = client
        .complete("Reply with the single word: ready")
        .await
        .expect("completion");
    assert!(!answer.is_empty());

    let rejected = OpenAiCompatibleChatClient::new(
        LlmProvider::Groq,
        &model,
        "gsk_definitely_not_valid",
        None,
        0.0,
    )
    .expect("client")
    .complete("ping")
    .await;
    assert!(matches!(
        rejected,
        Err(LlmProviderError::Authentication { provider: "groq", .. })
    ));
}
