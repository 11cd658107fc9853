/// Integration tests for the chat simulator

#[cfg(test)]
mod tests {
    use rag_cost_core::cost::{
        CostCalculator, EmbeddingModel, GenerativeModel, ModelId, ModelPricing, PricingCatalog,
    };
    use rag_cost_core::error::RagCostError;
    use rag_cost_core::observability::MetricsCollector;
    use rag_cost_core::pipeline::{
        ImmediateScheduler, PipelineSettings, ResponseKind, StageKind, StageStatus,
    };
    use rag_cost_core::retrieval::CorpusIndex;
    use rag_cost_core::session::{Role, SessionTotals};
    use rag_cost_core::tokens::estimate_tokens;
    use rag_cost_core::{ChatSimulator, SimulatorConfig, TurnSelection};

    const BEACH_QUERY: &str =
        "Show me 2-bedroom apartments near the beach with parking in St Kilda";

    fn simulator() -> ChatSimulator {
        ChatSimulator::new(
            CostCalculator::new(),
            CorpusIndex::builtin(),
            Box::new(ImmediateScheduler),
            PipelineSettings::default(),
        )
    }

    fn selection(include_retrieval: bool) -> TurnSelection {
        TurnSelection {
            model: GenerativeModel::Gpt4o,
            embedding_model: EmbeddingModel::TextEmbedding3Small,
            include_retrieval,
        }
    }

    #[tokio::test]
    async fn test_beach_query_with_retrieval() {
        let mut sim = simulator();
        let outcome = sim.send(BEACH_QUERY, selection(true)).await.unwrap().unwrap();
        let entry = &outcome.entry;

        assert_eq!(outcome.response_kind, ResponseKind::BeachLocation);
        assert_eq!(entry.embedding_tokens, Some(estimate_tokens(BEACH_QUERY)));

        let prompt = sim.session().last_prompt().unwrap();
        assert!(prompt.starts_with("User Query: "));
        assert_eq!(entry.input_tokens, estimate_tokens(prompt));
        assert!(entry.input_tokens > estimate_tokens(BEACH_QUERY));
        assert_eq!(entry.input_cost, entry.input_tokens as f64 / 1_000_000.0 * 5.0);
        assert_eq!(
            entry.total_cost,
            entry.input_cost + entry.output_cost + entry.embedding_cost_or_zero()
        );

        let messages = sim.session().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].tokens, estimate_tokens(BEACH_QUERY));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].cost, entry.output_cost);
        assert_eq!(messages[1].embedding_cost, entry.embedding_cost);

        let matched = sim.session().matched_records();
        assert_eq!(matched.len(), 4);
        assert!(matched.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(matched.iter().all(|r| r.score > 0.5));
    }

    #[tokio::test]
    async fn test_stage_board_after_run() {
        let mut sim = simulator();
        let rx = sim.subscribe();
        sim.send(BEACH_QUERY, selection(true)).await.unwrap();

        let board = sim.session().stage_board().unwrap();
        assert!(board.is_finished());
        for stage in sim.session().stages() {
            assert_eq!(stage.status, StageStatus::Completed);
        }
        assert_eq!(
            board.get(StageKind::Embed).tokens,
            Some(estimate_tokens(BEACH_QUERY))
        );

        let order: Vec<StageKind> = board
            .transitions()
            .iter()
            .filter(|t| t.to == StageStatus::Processing)
            .map(|t| t.stage)
            .collect();
        assert_eq!(order, StageKind::ORDER.to_vec());

        assert!(!sim.is_busy());
        let snapshot = rx.borrow().clone();
        assert!(!snapshot.running);
        assert!(snapshot.board.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_direct_turn_leaves_embedding_totals() {
        let mut sim = simulator();
        sim.send(BEACH_QUERY, selection(true)).await.unwrap();
        let before = sim.session().totals();

        let outcome = sim
            .send("Do any of these have parking?", selection(false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.response_kind, ResponseKind::Parking);
        assert_eq!(outcome.entry.embedding_tokens, None);
        assert_eq!(outcome.entry.embedding_cost_or_zero(), 0.0);
        assert_eq!(outcome.entry.input_tokens, estimate_tokens("Do any of these have parking?"));

        let after = sim.session().totals();
        assert_eq!(after.turns, 2);
        assert_eq!(after.embedding_tokens, before.embedding_tokens);
        assert_eq!(after.embedding_cost, before.embedding_cost);
        assert!(sim.session().stages().is_empty());
        assert!(sim.session().matched_records().is_empty());
        assert!(sim.session().last_prompt().is_none());
    }

    #[tokio::test]
    async fn test_unknown_model_leaves_session_untouched() {
        let mut sim = simulator();
        sim.send(BEACH_QUERY, selection(true)).await.unwrap();
        let before = sim.session().totals();

        let err = sim
            .send_raw("hello", "gpt-9", "text-embedding-3-small", true)
            .await
            .unwrap_err();
        assert!(matches!(err, RagCostError::UnknownModel(_)));
        assert_eq!(sim.session().totals(), before);
        assert_eq!(sim.session().messages().len(), 2);
    }

    #[tokio::test]
    async fn test_unpriced_model_rejected_before_user_message() {
        let catalog = PricingCatalog::from_entries([(
            ModelId::Generative(GenerativeModel::Gpt4o),
            ModelPricing::Generative {
                input_price_per_1m: 5.0,
                output_price_per_1m: 15.0,
            },
        )])
        .unwrap();
        let mut sim = ChatSimulator::new(
            CostCalculator::with_catalog(catalog),
            CorpusIndex::builtin(),
            Box::new(ImmediateScheduler),
            PipelineSettings::default(),
        );

        let err = sim.send("hello", selection(true)).await.unwrap_err();
        assert!(matches!(err, RagCostError::UnknownModel(_)));
        assert!(sim.session().messages().is_empty());
        assert_eq!(sim.session().totals(), SessionTotals::default());

        // the same catalog still prices a turn without embedding
        assert!(sim.send("hello", selection(false)).await.unwrap().is_some());
        assert_eq!(sim.session().totals().turns, 1);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let mut sim = simulator();
        assert!(sim.send("", selection(true)).await.unwrap().is_none());
        assert!(sim.send("   \n\t", selection(true)).await.unwrap().is_none());
        assert!(sim.session().messages().is_empty());
        assert!(sim.session().ledger().is_empty());
    }

    #[tokio::test]
    async fn test_totals_match_history_over_turns() {
        let mut sim = simulator();
        let queries = [
            "Hi there",
            BEACH_QUERY,
            "Which ones have a garage?",
            "Tell me about the area",
            "Anything on the waterfront in St. Kilda?",
        ];
        for (i, query) in queries.iter().enumerate() {
            sim.send(query, selection(i % 2 == 0)).await.unwrap();
            let session = sim.session();
            assert_eq!(session.totals(), SessionTotals::fold(session.history()));
        }

        let totals = sim.session().totals();
        assert_eq!(totals.turns, queries.len());
        assert_eq!(
            totals.session_tokens(),
            totals.input_tokens + totals.output_tokens + totals.embedding_tokens
        );
    }

    #[tokio::test]
    async fn test_config_overrides_rates() {
        let config = SimulatorConfig::from_toml_str(
            r#"
            [pricing_overrides."gpt-4o"]
            input_price_per_1m = 2.5
            output_price_per_1m = 10.0
            "#,
        )
        .unwrap();
        let mut sim = ChatSimulator::from_config(&config, Box::new(ImmediateScheduler)).unwrap();
        let outcome = sim.send(BEACH_QUERY, selection(true)).await.unwrap().unwrap();

        let entry = outcome.entry;
        assert_eq!(entry.input_cost, entry.input_tokens as f64 / 1_000_000.0 * 2.5);
        assert_eq!(entry.output_cost, entry.output_tokens as f64 / 1_000_000.0 * 10.0);
    }

    #[tokio::test]
    async fn test_metrics_follow_turns() {
        let mut sim = simulator().with_metrics(MetricsCollector::new().unwrap());
        sim.send(BEACH_QUERY, selection(true)).await.unwrap();
        sim.send("thanks", selection(false)).await.unwrap();

        let metrics = sim.metrics().unwrap();
        let summary = metrics.summary();
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.stage_errors, 0);
        assert!((summary.total_cost_usd - sim.session().totals().total_cost).abs() < 1e-12);

        let text = metrics.export().unwrap();
        assert!(text.contains("rag_active_runs 0"));
        assert!(text.contains("rag_stage_latency_seconds_count{stage=\"generate\"} 1"));
    }

    #[tokio::test]
    async fn test_json_snapshot() {
        let mut sim = simulator();
        sim.send(BEACH_QUERY, selection(true)).await.unwrap();

        let value: serde_json::Value = serde_json::from_str(&sim.session().to_json().unwrap()).unwrap();
        assert_eq!(value["session_id"], sim.session().session_id.as_str());
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["stages"].as_array().unwrap().len(), 5);
        assert_eq!(value["stages"][0]["status"], "completed");
        assert_eq!(value["matched_records"][0]["id"], "prop1");
        assert_eq!(value["totals"]["turns"], 1);
        assert_eq!(value["history"].as_array().unwrap().len(), 1);
    }
}
