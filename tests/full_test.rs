// cargo test
// cargo test -- --ignored --nocapture --test-threads=1

use audit_rag::{
    auth::KeyPairSigner,
    convo::{Chat, SessionConfig},
    datam::{Role, SearchRow},
    discovery::ServiceMetadata,
    error::RagError,
    orchestra::Orchestra,
    prompts::OUT_OF_SCOPE_MSG,
    providers::{CompletionModel, CompletionProvider, SearchProvider},
    retrieval::CitationColumns,
};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const SERVICE: &str = "INFORMES_DATASET_SERVICE";
const SCENARIO_QUESTION: &str = "¿Qué observaciones tiene el informe 045-2023?";

// --- Offline backends ---

#[derive(Debug, Clone, PartialEq)]
struct SearchCall {
    service: String,
    query: String,
    columns: Vec<String>,
    limit: usize,
}

#[derive(Default)]
struct MockSearch {
    services: Vec<ServiceMetadata>,
    rows: Vec<SearchRow>,
    calls: Mutex<Vec<SearchCall>>,
}

impl MockSearch {
    /// Services exposing the citation columns besides their search column.
    fn with_services(services: &[(&str, &str)]) -> Self {
        Self::with_metadata(
            services
                .iter()
                .map(|&(name, column)| ServiceMetadata::new(name, column, &[column, "RELATIVE_PATH", "SECTION_ID"]))
                .collect(),
        )
    }

    fn with_metadata(services: Vec<ServiceMetadata>) -> Self {
        Self { services, ..Default::default() }
    }

    fn with_rows(mut self, rows: Vec<serde_json::Value>) -> Self {
        self.rows = rows.into_iter().filter_map(|v| v.as_object().cloned()).collect();
        self
    }

    fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn list_services(&self) -> Result<Vec<String>, RagError> {
        Ok(self.services.iter().map(|s| s.name.clone()).collect())
    }

    async fn describe_service(&self, service: &str) -> Result<ServiceMetadata, RagError> {
        self.services
            .iter()
            .find(|s| s.name == service)
            .cloned()
            .ok_or_else(|| RagError::DiscoveryError(format!("no such service {}", service)))
    }

    // Like Cortex Search: undeclared columns are rejected and each row
    // carries only the requested columns.
    async fn search(
        &self,
        service: &str,
        query: &str,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<SearchRow>, RagError> {
        self.calls.lock().unwrap().push(SearchCall {
            service: service.to_string(),
            query: query.to_string(),
            columns: columns.to_vec(),
            limit,
        });
        let metadata = self.describe_service(service).await?;
        if let Some(unknown) = columns.iter().find(|c| metadata.column_named(c).is_none()) {
            return Err(RagError::ApiError {
                status: 400,
                body: format!("invalid column {}", unknown),
            });
        }
        Ok(self
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                row.iter()
                    .filter(|(key, _)| columns.iter().any(|c| c.eq_ignore_ascii_case(key)))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect())
    }
}

/// Replies with the scripted texts in order, then with a fixed answer.
#[derive(Default)]
struct MockCompletion {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<(CompletionModel, String)>>,
}

impl MockCompletion {
    fn scripted(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        }
    }

    fn prompts(&self) -> Vec<(CompletionModel, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn complete(&self, model: CompletionModel, prompt: &str) -> Result<String, RagError> {
        self.prompts.lock().unwrap().push((model, prompt.to_string()));
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| "respuesta".to_string()))
    }
}

fn report_rows() -> Vec<serde_json::Value> {
    vec![
        json!({"CHUNK": "Se observó el pago irregular.", "RELATIVE_PATH": "informes/045-2023.pdf", "SECTION_ID": "3"}),
        json!({"CHUNK": "Recomendación al titular.", "RELATIVE_PATH": "informes/045-2023.pdf", "SECTION_ID": null}),
    ]
}

async fn chat_with(
        search: Arc<MockSearch>,
        completion: Arc<MockCompletion>,
        config: SessionConfig,
    ) -> Chat {
    let orchestra = Orchestra::discover(search, completion, CitationColumns::default())
        .await
        .expect("discovery against the mock backend succeeds");
    Chat::new(orchestra, config)
}

fn config(use_chat_history: bool) -> SessionConfig {
    SessionConfig::for_service(SERVICE, use_chat_history)
}

// --- Test: Discovery ---
// Goal: Every listed service is described, in listing order.
#[tokio::test]
async fn test_discovery_builds_metadata() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK"), ("OTRO_SERVICE", "TEXTO")]));
    let chat = chat_with(search, Arc::new(MockCompletion::default()), config(true)).await;

    assert_eq!(
        chat.services(),
        &[
            ServiceMetadata::new(SERVICE, "CHUNK", &["CHUNK", "RELATIVE_PATH", "SECTION_ID"]),
            ServiceMetadata::new("OTRO_SERVICE", "TEXTO", &["TEXTO", "RELATIVE_PATH", "SECTION_ID"]),
        ]
    );
    assert_eq!(chat.config.selected_service.as_deref(), Some(SERVICE));
}

// --- Test: Default Service Fallback ---
// Goal: An undiscovered preferred service falls back to the first one found.
#[tokio::test]
async fn test_unknown_default_service_falls_back() {
    let search = Arc::new(MockSearch::with_services(&[("A_SERVICE", "CHUNK"), ("B_SERVICE", "CHUNK")]));
    let mut chat = chat_with(search, Arc::new(MockCompletion::default()), config(true)).await;
    assert_eq!(chat.config.selected_service.as_deref(), Some("A_SERVICE"));

    chat.select_service("B_SERVICE").unwrap();
    assert_eq!(chat.config.selected_service.as_deref(), Some("B_SERVICE"));
    assert!(chat.select_service("NOPE").is_err());
    assert_eq!(chat.config.selected_service.as_deref(), Some("B_SERVICE"));
}

// --- Test: Out Of Scope ---
// Goal: Questions without a topic keyword get the fixed notice and reach no backend.
#[tokio::test]
async fn test_out_of_scope_question() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion.clone(), config(true)).await;

    let outcome = chat.send("¿Cuál es la capital de Francia?").await.unwrap();
    println!("Response: {}", outcome.response);

    assert!(outcome.out_of_scope);
    assert_eq!(outcome.response, OUT_OF_SCOPE_MSG);
    assert!(outcome.context.is_none());
    assert!(search.calls().is_empty());
    assert!(completion.prompts().is_empty());

    let messages = chat.conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, OUT_OF_SCOPE_MSG);
}

// --- Test: Scenario Question Without History ---
// Goal: One retrieval with the question, one completion, raw answer recorded.
#[tokio::test]
async fn test_scenario_question_without_history() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::scripted(&["  El informe observa un pago irregular.\n"]));
    let mut chat = chat_with(search.clone(), completion.clone(), config(false)).await;

    let outcome = chat.send(SCENARIO_QUESTION).await.unwrap();

    assert!(!outcome.out_of_scope);
    assert_eq!(outcome.response, "  El informe observa un pago irregular.\n");
    assert!(outcome.history_summary.is_none());
    assert_eq!(
        outcome.context.as_deref(),
        Some(
            "Documento: informes/045-2023.pdf, Sección: 3\nSe observó el pago irregular.\n\n\
             Documento: informes/045-2023.pdf, Sección: N/D\nRecomendación al titular.\n\n"
        )
    );

    let calls = search.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].service, SERVICE);
    assert_eq!(calls[0].query, SCENARIO_QUESTION);
    assert_eq!(calls[0].limit, 5);
    assert_eq!(calls[0].columns, vec!["CHUNK", "RELATIVE_PATH", "SECTION_ID"]);

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, CompletionModel::MistralLarge);
    assert!(prompts[0].1.contains(&format!("<question>\n{}\n</question>", SCENARIO_QUESTION)));
    assert!(prompts[0].1.contains("<chat_history>\n\n</chat_history>"));
    assert!(prompts[0].1.contains("Documento: informes/045-2023.pdf, Sección: 3"));

    let messages = chat.conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, SCENARIO_QUESTION);
    assert_eq!(messages[1].content, outcome.response);
}

// --- Test: History Summary ---
// Goal: With history on and a prior turn, retrieval runs on the rewritten question.
#[tokio::test]
async fn test_history_summary_drives_retrieval() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::scripted(&[
        "Primera respuesta.",
        "¿Qué recomendaciones tiene el informe 045-2023?",
        "Segunda respuesta.",
    ]));
    let mut chat = chat_with(search.clone(), completion.clone(), config(true)).await;

    // First turn: empty window, so no summary call.
    let first = chat.send(SCENARIO_QUESTION).await.unwrap();
    assert!(first.history_summary.is_none());
    assert_eq!(completion.prompts().len(), 1);

    let second = chat.send("¿Y sus recomendaciones del informe?").await.unwrap();
    assert_eq!(
        second.history_summary.as_deref(),
        Some("¿Qué recomendaciones tiene el informe 045-2023?")
    );
    assert_eq!(second.response, "Segunda respuesta.");

    let calls = search.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].query, "¿Qué recomendaciones tiene el informe 045-2023?");

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 3);
    let summary_prompt = &prompts[1].1;
    assert!(summary_prompt.contains(&format!("User: {}\nAssistant: Primera respuesta.\n", SCENARIO_QUESTION)));
    // The main prompt still carries the question as asked.
    assert!(prompts[2].1.contains("<question>\n¿Y sus recomendaciones del informe?\n</question>"));
    assert_eq!(chat.conversation.len(), 4);
}

// --- Test: History Toggle Off ---
// Goal: No summary call even with prior turns.
#[tokio::test]
async fn test_history_disabled_skips_summary() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion.clone(), config(false)).await;

    chat.send(SCENARIO_QUESTION).await.unwrap();
    let second = chat.send("Otra pregunta del informe").await.unwrap();

    assert!(second.history_summary.is_none());
    assert_eq!(completion.prompts().len(), 2);
    assert_eq!(search.calls()[1].query, "Otra pregunta del informe");
}

// --- Test: Quote Stripping ---
// Goal: Single quotes never reach the backends; the stored message keeps them.
#[tokio::test]
async fn test_single_quotes_are_stripped() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion.clone(), config(false)).await;

    chat.send("¿Qué dice el informe 'especial'?").await.unwrap();

    assert_eq!(search.calls()[0].query, "¿Qué dice el informe especial?");
    assert!(!completion.prompts()[0].1.contains("'especial'"));
    assert_eq!(chat.conversation.messages()[0].content, "¿Qué dice el informe 'especial'?");
}

// --- Test: Clear ---
// Goal: Clearing empties the conversation and the next turn has no history.
#[tokio::test]
async fn test_clear_resets_history() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search, completion.clone(), config(true)).await;

    chat.send(SCENARIO_QUESTION).await.unwrap();
    chat.clear();
    assert!(chat.conversation.is_empty());

    let outcome = chat.send(SCENARIO_QUESTION).await.unwrap();
    assert!(outcome.history_summary.is_none());
    assert_eq!(completion.prompts().len(), 2);
}

// --- Test: No Services ---
// Goal: Without search services input is disabled and nothing is called.
#[tokio::test]
async fn test_no_services_disables_input() {
    let search = Arc::new(MockSearch::default());
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion.clone(), config(true)).await;

    assert!(!chat.input_enabled());
    assert!(chat.config.selected_service.is_none());

    let result = chat.send(SCENARIO_QUESTION).await;
    assert!(matches!(result, Err(RagError::ChatError(_))));
    assert!(chat.conversation.is_empty());
    assert!(search.calls().is_empty());
    assert!(completion.prompts().is_empty());
}

// --- Test: Retrieval Limit ---
// Goal: The chunk option is passed as the search limit.
#[tokio::test]
async fn test_chunk_option_limits_search() {
    let search = Arc::new(MockSearch::with_services(&[(SERVICE, "CHUNK")]).with_rows(report_rows()));
    let mut cfg = config(false);
    cfg.set_num_retrieved_chunks(1).unwrap();
    cfg.model = CompletionModel::Llama3_70b;
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion.clone(), cfg).await;

    let outcome = chat.send(SCENARIO_QUESTION).await.unwrap();

    assert_eq!(search.calls()[0].limit, 1);
    assert_eq!(
        outcome.context.as_deref(),
        Some("Documento: informes/045-2023.pdf, Sección: 3\nSe observó el pago irregular.\n\n")
    );
    assert_eq!(completion.prompts()[0].0, CompletionModel::Llama3_70b);
}

// --- Test: Service Without Citation Columns ---
// Goal: Only exposed columns are requested; missing citations read N/D.
#[tokio::test]
async fn test_service_without_citation_columns() {
    let search = Arc::new(
        MockSearch::with_metadata(vec![
            ServiceMetadata::new(SERVICE, "CHUNK", &["CHUNK", "RELATIVE_PATH", "SECTION_ID"]),
            ServiceMetadata::new("OTRO_SERVICE", "TEXTO", &["TEXTO", "FECHA"]),
        ])
        .with_rows(vec![json!({"TEXTO": "Hallazgo sobre la entidad.", "FECHA": "2023-05-02"})]),
    );
    let completion = Arc::new(MockCompletion::default());
    let mut chat = chat_with(search.clone(), completion, config(false)).await;
    chat.select_service("OTRO_SERVICE").unwrap();

    let outcome = chat.send("¿Qué hallazgo tiene el informe?").await.unwrap();

    let calls = search.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].service, "OTRO_SERVICE");
    assert_eq!(calls[0].columns, vec!["TEXTO"]);
    assert_eq!(
        outcome.context.as_deref(),
        Some("Documento: N/D, Sección: N/D\nHallazgo sobre la entidad.\n\n")
    );
}

// --- Test: Key-Pair JWT ---
// Goal: Tokens verify against the public key and name the registered fingerprint.
#[test]
fn test_keypair_jwt_claims() {
    let private_pem = include_str!("fixtures/rsa_key.p8");
    let public_pem = include_str!("fixtures/rsa_key.pub");
    let fingerprint = include_str!("fixtures/rsa_key.fingerprint").trim();

    let signer = KeyPairSigner::new("xy12345.us-east-2.aws", "analista", private_pem).unwrap();
    assert_eq!(signer.fingerprint(), format!("SHA256:{}", fingerprint));

    let token = signer.sign().unwrap();
    let key = DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap();
    let data = decode::<serde_json::Value>(&token, &key, &Validation::new(Algorithm::RS256)).unwrap();

    assert_eq!(data.claims["iss"], format!("XY12345.ANALISTA.SHA256:{}", fingerprint));
    assert_eq!(data.claims["sub"], "XY12345.ANALISTA");
    let iat = data.claims["iat"].as_i64().unwrap();
    let exp = data.claims["exp"].as_i64().unwrap();
    assert_eq!(exp - iat, 59 * 60);
}

// --- Test: Live Snowflake ---
// Goal: A real session discovers services and answers the scenario question.
#[tokio::test]
#[ignore]
async fn test_live_session() {
    use audit_rag::config::Settings;
    use audit_rag::providers::{cortex_complete::CortexComplete, cortex_search::CortexSearch};
    use audit_rag::session::SnowflakeSession;

    let settings = Settings::from_env();
    let session = Arc::new(SnowflakeSession::connect(None, &settings).expect("Snowflake session"));
    let search = Arc::new(CortexSearch::new(session.clone(), &settings.search));
    let completion = Arc::new(CortexComplete::new(session));
    let orchestra = Orchestra::discover(search, completion, CitationColumns::from_settings(&settings.search))
        .await
        .expect("service discovery");

    println!("Services: {:?}", orchestra.services());
    let mut chat = Chat::new(orchestra, SessionConfig::for_service(&settings.search.default_service, false));
    let outcome = chat.send(SCENARIO_QUESTION).await.expect("live turn");
    println!("Context:\n{}", outcome.context.unwrap_or_default());
    println!("Response:\n{}", outcome.response);
    assert!(!outcome.response.is_empty());
}
