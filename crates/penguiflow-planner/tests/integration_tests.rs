use std::sync::Arc;

use penguiflow_checkpoint::InMemoryStateStore;
use penguiflow_core::{Emission, Headers, Node};
use penguiflow_llm::MockLlmClient;
use penguiflow_planner::action::JoinSpec;
use penguiflow_planner::budget::{Budgets, PlanningHints};
use penguiflow_planner::pause::{pause_request, PauseReason};
use penguiflow_planner::planner::{FinishReason, PlannerBuilder, RunOutcome};
use serde_json::json;

fn echo_node(id: &str) -> Node {
    let id = id.to_string();
    Node::new(
        id.clone(),
        id,
        Arc::new(|payload, _ctx| Box::pin(async move { Ok(Emission::all(payload)) })),
    )
}

fn counting_node(id: &str, count: Arc<std::sync::atomic::AtomicUsize>) -> Node {
    let id = id.to_string();
    Node::new(
        id.clone(),
        id,
        Arc::new(move |payload, _ctx| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Emission::all(payload))
            })
        }),
    )
}

fn failing_node(id: &str) -> Node {
    let id = id.to_string();
    Node::new(
        id.clone(),
        id,
        Arc::new(|_payload, _ctx| Box::pin(async move { Err(anyhow_err("boom")) })),
    )
}

fn anyhow_err(msg: &str) -> penguiflow_core::GraphError {
    penguiflow_core::GraphError::node_execution("failing", 1, msg.to_string())
}

fn merge_node() -> Node {
    Node::new(
        "merge_searches",
        "merge_searches",
        Arc::new(|payload, _ctx| {
            Box::pin(async move {
                let results = payload.get("results").cloned().unwrap_or(json!([]));
                let expect = payload.get("expect").cloned().unwrap_or(json!(0));
                let count = results.as_array().map(|a| a.len()).unwrap_or(0);
                Ok(Emission::all(json!({
                    "sources_searched": expect,
                    "total_count": count,
                })))
            })
        }),
    )
}

fn headers() -> Headers {
    Headers::new("acme")
}

#[tokio::test]
async fn linear_pipeline_sequential_action_then_finish() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"call triage","next_node":"triage","args":{}}"#,
        r#"{"thought":"done","final":{"raw_answer":"ok"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(echo_node("triage"))
        .build();

    let outcome = planner
        .run("show marketing metrics", headers(), "trace-1")
        .await
        .unwrap();

    match outcome {
        RunOutcome::Finish { reason, payload, .. } => {
            assert_eq!(reason, FinishReason::AnswerComplete);
            assert_eq!(payload["raw_answer"], json!("ok"));
        }
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_node_is_rejected_and_llm_is_asked_to_revise() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"try bogus","next_node":"does_not_exist","args":{}}"#,
        r#"{"thought":"call triage instead","next_node":"triage","args":{}}"#,
        r#"{"thought":"done","final":{"raw_answer":"ok"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(echo_node("triage"))
        .build();

    let outcome = planner.run("query", headers(), "trace-2").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, .. } => assert_eq!(reason, FinishReason::AnswerComplete),
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn parallel_plan_with_join_combines_successful_branches() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"search in parallel","plan":[
            {"node":"search_web","args":{}},
            {"node":"search_db","args":{}},
            {"node":"search_vec","args":{}}
        ],"join":{"node":"merge_searches"}}"#,
        r#"{"thought":"done","final":{"raw_answer":"penguins are birds"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tools(vec![
            echo_node("search_web"),
            echo_node("search_db"),
            echo_node("search_vec"),
            merge_node(),
        ])
        .build();

    let outcome = planner.run("penguins", headers(), "trace-3").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, .. } => assert_eq!(reason, FinishReason::AnswerComplete),
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn partial_branch_failure_skips_join_and_reports_stats() {
    use penguiflow_planner::tool_exec::execute_plan;
    use penguiflow_core::{CancellationRegistry, SchemaRegistry};

    let nodes = vec![echo_node("search_web"), failing_node("search_db"), echo_node("search_vec")];
    let plan = vec![
        plan_item("search_web"),
        plan_item("search_db"),
        plan_item("search_vec"),
    ];
    let join = JoinSpec {
        node: "merge_searches".to_string(),
    };
    let cancellation = CancellationRegistry::new();
    let registry = SchemaRegistry::default();

    let result = execute_plan(
        &plan,
        Some(&join),
        |id| nodes.iter().find(|n| n.node_id == id).cloned(),
        "trace-4",
        &headers(),
        &cancellation,
        &registry,
    )
    .await
    .unwrap();

    let observation = result.to_json();
    assert_eq!(observation["stats"]["success"], json!(2));
    assert_eq!(observation["stats"]["failed"], json!(1));
    assert_eq!(observation["join"]["status"], json!("skipped"));
    assert_eq!(observation["join"]["reason"], json!("branch_failures"));
    assert!(observation["join"]["failures"].as_array().unwrap().len() == 1);
}

fn plan_item(node: &str) -> penguiflow_planner::action::PlanItem {
    penguiflow_planner::action::PlanItem {
        node: node.to_string(),
        args: json!({}),
    }
}

#[tokio::test]
async fn pause_then_resume_feeds_user_input_as_observation() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"need region","next_node":"ask_user","args":{"question":"region?"}}"#,
        r#"{"thought":"thanks","final":{"raw_answer":"EMEA pricing applies"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let ask_user = Node::new(
        "ask_user",
        "ask_user",
        Arc::new(|payload, _ctx| {
            Box::pin(async move {
                Ok(Emission::all(pause_request(
                    PauseReason::AwaitInput,
                    json!({"question": payload.get("question").cloned().unwrap_or(json!(null))}),
                )))
            })
        }),
    );

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(ask_user)
        .build();

    let outcome = planner.run("need region", headers(), "trace-5").await.unwrap();
    let (token, reason) = match outcome {
        RunOutcome::Pause {
            resume_token,
            reason,
            ..
        } => (resume_token, reason),
        other => panic!("expected Pause, got {other:?}"),
    };
    assert_eq!(reason, PauseReason::AwaitInput);

    let resumed = planner.resume(&token, json!("EMEA")).await.unwrap();
    match resumed {
        RunOutcome::Finish { reason, payload, .. } => {
            assert_eq!(reason, FinishReason::AnswerComplete);
            assert_eq!(payload["raw_answer"], json!("EMEA pricing applies"));
        }
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn resume_is_idempotent_for_repeated_token_and_input() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"need region","next_node":"ask_user","args":{}}"#,
        r#"{"thought":"thanks","final":{"raw_answer":"first answer"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let ask_user = Node::new(
        "ask_user",
        "ask_user",
        Arc::new(|_payload, _ctx| {
            Box::pin(async move {
                Ok(Emission::all(pause_request(PauseReason::AwaitInput, json!({}))))
            })
        }),
    );

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(ask_user)
        .build();

    let outcome = planner.run("q", headers(), "trace-6").await.unwrap();
    let token = match outcome {
        RunOutcome::Pause { resume_token, .. } => resume_token,
        other => panic!("expected Pause, got {other:?}"),
    };

    let first = planner.resume(&token, json!("EMEA")).await.unwrap();
    // The LLM script has exactly one remaining response; a second resume
    // with the same (token, input) must not consume it again.
    let second = planner.resume(&token, json!("EMEA")).await.unwrap();

    let first_json = serde_json::to_value(&first).unwrap();
    let second_json = serde_json::to_value(&second).unwrap();
    assert_eq!(first_json, second_json);
}

#[tokio::test]
async fn budget_exhaustion_after_max_iters_hops() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"1","next_node":"triage","args":{}}"#,
        r#"{"thought":"2","next_node":"triage","args":{}}"#,
        r#"{"thought":"3","next_node":"triage","args":{}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(3, 3, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(echo_node("triage"))
        .build();

    let outcome = planner.run("q", headers(), "trace-7").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, metadata, .. } => {
            assert_eq!(reason, FinishReason::BudgetExhausted);
            assert_eq!(metadata["which"], json!("hops"));
        }
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn no_path_finish_when_llm_admits_inability() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"I cannot find a way to answer this","final":{}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(echo_node("triage"))
        .build();

    let outcome = planner.run("impossible", headers(), "trace-8").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, .. } => assert_eq!(reason, FinishReason::NoPath),
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn absolute_max_parallel_violation_triggers_revise_then_no_path() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"too wide","plan":[
            {"node":"search_web","args":{}},
            {"node":"search_db","args":{}},
            {"node":"search_vec","args":{}}
        ]}"#,
        r#"{"thought":"still too wide","plan":[
            {"node":"search_web","args":{}},
            {"node":"search_db","args":{}},
            {"node":"search_vec","args":{}}
        ]}"#,
        r#"{"thought":"give up","final":{}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);
    let hints = PlanningHints {
        absolute_max_parallel: Some(2),
        ..Default::default()
    };

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tools(vec![
            echo_node("search_web"),
            echo_node("search_db"),
            echo_node("search_vec"),
        ])
        .with_hints(hints)
        .build();

    let outcome = planner.run("penguins", headers(), "trace-9").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, .. } => assert_eq!(reason, FinishReason::NoPath),
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn trajectory_compression_preserves_termination_reason() {
    // A tiny token budget forces compression on every iteration; the
    // planner must still reach the same terminating reason it would
    // without compression (law: "Trajectory compression preserves
    // termination").
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"1","next_node":"triage","args":{}}"#,
        r#"{"thought":"2","next_node":"triage","args":{}}"#,
        r#"{"thought":"done","final":{"raw_answer":"ok"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 1);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(echo_node("triage"))
        .with_compression_keep_recent(1)
        .build();

    let outcome = planner.run("q", headers(), "trace-10").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, payload, .. } => {
            assert_eq!(reason, FinishReason::AnswerComplete);
            assert_eq!(payload["raw_answer"], json!("ok"));
        }
        other => panic!("expected Finish, got {other:?}"),
    }
}

#[tokio::test]
async fn tool_filtering_hides_nodes_from_catalog_and_llm_cannot_call_them() {
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"thought":"try hidden tool","next_node":"admin_only","args":{}}"#,
        r#"{"thought":"fall back","next_node":"triage","args":{}}"#,
        r#"{"thought":"done","final":{"raw_answer":"ok"}}"#,
    ]));
    let store = Arc::new(InMemoryStateStore::new());
    let budgets = Budgets::new(10, 10, 100_000);

    let planner = PlannerBuilder::new(llm, store, budgets)
        .with_tool(counting_node("admin_only", counter.clone()))
        .with_tool(echo_node("triage"))
        .with_visibility(Arc::new(|entry, _headers| entry.node_id != "admin_only"))
        .build();

    let outcome = planner.run("q", headers(), "trace-11").await.unwrap();
    match outcome {
        RunOutcome::Finish { reason, .. } => assert_eq!(reason, FinishReason::AnswerComplete),
        other => panic!("expected Finish, got {other:?}"),
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
}
