//! The turn loop: budget check, model call, tool dispatch, repeat.

use operative_config::OperativeConfig;
use operative_core::{
    Budget, Conversation, Message, ModelClient, PressureInfo, StopReason, TokenUsage,
    ToolDefinition, ToolRegistry,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::dispatch::{ToolBatch, ToolOutcome};
use crate::middleware::{
    ErrorPolicy, Middleware, MiddlewareStack, RequestContext, ResponseContext, ToolCallContext,
    ToolDecision, ToolErrorRecovery, ToolPolicy,
};
use crate::operation::{Operation, OperationStream, RunResult, ToolFailure, ToolRejection};

const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Drives runs against one model client, tool set, budget, and middleware list.
///
/// All four are fixed at construction. Each call to [`run`](Self::run) or
/// [`resume`](Self::resume) starts an independent run on its own task.
#[derive(Clone)]
pub struct Operative {
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    system_prompt: Option<String>,
    budget: Budget,
    middleware: MiddlewareStack,
    channel_capacity: usize,
}

impl Operative {
    pub fn new(client: Arc<dyn ModelClient>, tools: ToolRegistry) -> Self {
        Self {
            client,
            tools: Arc::new(tools),
            system_prompt: None,
            budget: Budget::default(),
            middleware: MiddlewareStack::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Build from loaded configuration, installing the tool and error
    /// policies it describes.
    pub fn from_config(
        config: &OperativeConfig,
        client: Arc<dyn ModelClient>,
        tools: ToolRegistry,
    ) -> Self {
        let mut operative = Self::new(client, tools)
            .with_system_prompt(config.system_prompt.clone())
            .with_budget(config.budget());
        if !config.tools.allow.is_empty() || !config.tools.deny.is_empty() {
            operative = operative.with_middleware(ToolPolicy::from_config(&config.tools));
        }
        if !config.tools.fatal.is_empty() {
            operative = operative.with_middleware(ErrorPolicy::from_config(&config.tools));
        }
        operative
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Append an interceptor. Interceptors run in the order they are added.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware = self.middleware.with(Arc::new(middleware));
        self
    }

    /// How many events may queue ahead of a slow consumer.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a run on a fresh conversation.
    pub fn run(&self, input: impl Into<String>) -> OperationStream {
        self.resume(Conversation::new(), input)
    }

    /// Continue `conversation` with a new user message.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn resume(&self, mut conversation: Conversation, input: impl Into<String>) -> OperationStream {
        if let Some(prompt) = &self.system_prompt
            && !conversation.has_system_prompt()
        {
            conversation.messages.insert(0, Message::system(prompt.clone()));
        }
        conversation.push(Message::user(input));

        let tool_definitions = self.tools.definitions();
        conversation.tools = tool_definitions.clone();
        conversation.max_output_tokens = self.budget.max_tokens_per_turn;

        info!(
            conversation_id = %conversation.id,
            client = self.client.name(),
            messages = conversation.messages.len(),
            tools = ?self.tools.names(),
            "Starting run"
        );

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let turns = TurnLoop {
            client: self.client.clone(),
            tools: self.tools.clone(),
            tool_definitions,
            budget: self.budget.clone(),
            middleware: self.middleware.clone(),
            conversation,
            cumulative: TokenUsage::ZERO,
            pressure: Vec::new(),
            turn: 0,
            started: Instant::now(),
            tx,
        };
        tokio::spawn(turns.drive());
        OperationStream::new(ReceiverStream::new(rx))
    }
}

impl std::fmt::Debug for Operative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operative")
            .field("client", &self.client.name())
            .field("tools", &self.tools.len())
            .field("budget", &self.budget)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// The consumer dropped the stream.
struct Disconnected;

enum Step {
    Next,
    Done(Operation),
}

fn explicit_stop(reason: impl Into<String>) -> Step {
    Step::Done(Operation::Stopped(StopReason::ExplicitStop(reason.into())))
}

/// State owned by one run. Lives on the spawned task and nowhere else.
struct TurnLoop {
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    tool_definitions: Vec<ToolDefinition>,
    budget: Budget,
    middleware: MiddlewareStack,
    conversation: Conversation,
    cumulative: TokenUsage,
    pressure: Vec<PressureInfo>,
    turn: u32,
    started: Instant,
    tx: mpsc::Sender<Operation>,
}

impl TurnLoop {
    async fn drive(mut self) {
        loop {
            match self.run_turn().await {
                Ok(Step::Next) => {}
                Ok(Step::Done(terminal)) => {
                    info!(
                        conversation_id = %self.conversation.id,
                        outcome = terminal.kind(),
                        turns = self.turn,
                        total_tokens = self.cumulative.total_tokens,
                        elapsed_ms = self.started.elapsed().as_millis() as u64,
                        "Run finished"
                    );
                    if let Operation::Stopped(reason) = &terminal {
                        info!(reason = %reason, "Run stopped");
                    }
                    let _ = self.tx.send(terminal).await;
                    return;
                }
                Err(Disconnected) => {
                    debug!(turn = self.turn, "Consumer dropped the stream; abandoning run");
                    return;
                }
            }
        }
    }

    async fn emit(&self, op: Operation) -> Result<(), Disconnected> {
        self.tx.send(op).await.map_err(|_| Disconnected)
    }

    async fn run_turn(&mut self) -> Result<Step, Disconnected> {
        self.turn += 1;
        let turn = self.turn;
        let elapsed = self.started.elapsed();

        if let Some(reason) = self.budget.should_stop(turn, &self.cumulative, elapsed) {
            return Ok(Step::Done(Operation::Stopped(reason)));
        }

        debug!(turn, "Turn started");
        self.emit(Operation::TurnStarted {
            turn,
            remaining: self.budget.remaining(turn, &self.cumulative, elapsed),
        })
        .await?;

        // ── Pre-request ──
        let mut request = RequestContext {
            turn,
            messages: std::mem::take(&mut self.conversation.messages),
            tool_definitions: self.tool_definitions.clone(),
            pressure: self.pressure.clone(),
        };
        let outcome = self.middleware.before_request(&mut request).await;
        self.conversation.messages = request.messages;
        self.conversation.tools = request.tool_definitions;
        if let Err(e) = outcome {
            return Ok(explicit_stop(e.message));
        }

        // ── Model call ──
        let call_started = Instant::now();
        let call = self.client.respond(self.conversation.clone());
        let response = match self.budget.time_left(self.started.elapsed()) {
            Some(left) => match tokio::time::timeout(left, call).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(turn, "Model call exceeded the time budget");
                    return Ok(Step::Done(Operation::Stopped(StopReason::Timeout)));
                }
            },
            None => call.await,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(turn, error = %e, "Model call failed");
                return Ok(explicit_stop(format!("model error: {e}")));
            }
        };
        debug!(
            turn,
            latency_ms = call_started.elapsed().as_millis() as u64,
            tool_calls = response.tool_calls.len(),
            "Model responded"
        );

        // ── Ledger ──
        let turn_usage = response.usage;
        self.cumulative += turn_usage;
        if let Some(cap) = self.budget.max_tokens_per_turn
            && turn_usage.total_tokens > cap
        {
            warn!(turn, used = turn_usage.total_tokens, cap, "Turn exceeded its token budget");
        }
        self.conversation = response.conversation;
        self.pressure = self.budget.pressure(&turn_usage, &self.cumulative);
        for info in self.pressure.clone() {
            debug!(turn, dimension = ?info.dimension, utilization = info.utilization, "Pressure");
            self.emit(Operation::Pressure(info)).await?;
        }

        // ── Post-response ──
        let mut response_ctx = ResponseContext {
            turn,
            response_text: response.text,
            thinking: response.thinking,
            tool_calls: response.tool_calls,
        };
        if let Err(e) = self.middleware.after_response(&mut response_ctx).await {
            return Ok(explicit_stop(e.message));
        }
        let ResponseContext {
            response_text,
            thinking,
            tool_calls,
            ..
        } = response_ctx;

        if let Some(thinking) = thinking.filter(|t| !t.is_empty()) {
            self.emit(Operation::Thinking(thinking)).await?;
        }
        if !response_text.is_empty() {
            self.emit(Operation::Text(response_text.clone())).await?;
        }

        if tool_calls.is_empty() {
            self.emit(Operation::TurnCompleted {
                turn,
                usage: turn_usage,
                tool_calls: 0,
                cumulative: self.cumulative,
            })
            .await?;
            let result = RunResult {
                text: response_text,
                conversation: self.conversation.clone(),
                usage: self.cumulative,
                turns_used: turn,
            };
            return Ok(Step::Done(Operation::Completed(result)));
        }

        // ── Tool phase ──
        self.emit(Operation::ToolsRequested(tool_calls.clone())).await?;

        let mut calls: Vec<ToolCallContext> =
            tool_calls.iter().cloned().map(ToolCallContext::new).collect();
        self.middleware.before_tool_calls(&mut calls).await;

        let (approved, rejected): (Vec<_>, Vec<_>) =
            calls.into_iter().partition(|call| !call.is_rejected());
        let rejections: Vec<ToolRejection> = rejected
            .into_iter()
            .filter_map(|call| match call.decision {
                ToolDecision::Reject(reason) => Some(ToolRejection {
                    request: call.request,
                    reason,
                }),
                _ => None,
            })
            .collect();
        if !rejections.is_empty() {
            info!(turn, rejected = rejections.len(), "Tool calls rejected");
            self.emit(Operation::ToolsRejected(rejections.clone())).await?;
        }

        if !self.conversation.ends_with_tool_calls(&tool_calls) {
            let content = Some(response_text);
            self.conversation
                .push(Message::assistant_tool_calls(content, &tool_calls));
        }
        for rejection in &rejections {
            self.conversation.push(Message::tool_result(
                rejection.request.tool_call_id.clone(),
                format!("Tool call rejected: {}", rejection.reason),
            ));
        }

        debug!(turn, approved = approved.len(), "Dispatching tool calls");
        let mut batch = ToolBatch::spawn(self.tools.clone(), approved);
        let mut stop_requested: Option<String> = None;

        while let Some(ToolOutcome { call, result }) = batch.next().await {
            let request = call.effective_request();
            match result {
                Ok(output) => {
                    if output.should_stop && stop_requested.is_none() {
                        stop_requested = Some(output.content.clone());
                    }
                    self.conversation.push(Message::tool_result(
                        request.tool_call_id.clone(),
                        output.content.clone(),
                    ));
                    self.emit(Operation::ToolCompleted { request, output }).await?;
                }
                Err(error) => {
                    warn!(turn, tool = %request.name, error = %error, "Tool call failed");
                    match self.middleware.on_tool_error(&error, &call).await {
                        ToolErrorRecovery::Feedback(message) => {
                            self.conversation.push(Message::tool_result(
                                request.tool_call_id.clone(),
                                format!("Error: {message}"),
                            ));
                            let failure = ToolFailure {
                                message,
                                cause: Arc::new(error),
                            };
                            self.emit(Operation::ToolFailed {
                                request,
                                error: failure,
                            })
                            .await?;
                        }
                        ToolErrorRecovery::Throw => {
                            batch.abort();
                            return Ok(explicit_stop(error.to_string()));
                        }
                    }
                }
            }
        }

        if let Some(reason) = stop_requested {
            info!(turn, reason = %reason, "Tool requested stop");
            return Ok(explicit_stop(reason));
        }

        self.emit(Operation::TurnCompleted {
            turn,
            usage: turn_usage,
            tool_calls: tool_calls.len(),
            cumulative: self.cumulative,
        })
        .await?;
        Ok(Step::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::LoggingMiddleware;
    use crate::test_helpers::{EchoTool, FailTool, Reply, ScriptedClient, SlowTool};
    use async_trait::async_trait;
    use operative_core::{ModelError, MiddlewareError, Role, ToolRequest};
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(EchoTool)
            .with(FailTool)
            .with(SlowTool::new(Duration::from_secs(30)))
    }

    fn operative(client: &Arc<ScriptedClient>) -> Operative {
        Operative::new(client.clone(), registry())
    }

    fn kinds(ops: &[Operation]) -> Vec<&'static str> {
        ops.iter().map(Operation::kind).collect()
    }

    fn stop_reason(ops: &[Operation]) -> Option<&StopReason> {
        match ops.last() {
            Some(Operation::Stopped(reason)) => Some(reason),
            _ => None,
        }
    }

    #[tokio::test]
    async fn simple_text_response() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::text("Hello! How can I help?")]));
        let result = operative(&client)
            .with_system_prompt("You are terse.")
            .run("Hello!")
            .result()
            .await
            .unwrap();

        assert_eq!(result.text, "Hello! How can I help?");
        assert_eq!(result.turns_used, 1);
        assert_eq!(result.usage.total_tokens, 15);
        // System + User + Assistant
        let roles: Vec<Role> = result.conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn resume_keeps_existing_system_prompt() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::text("one"), Reply::text("two")]));
        let agent = operative(&client).with_system_prompt("sys");
        let first = agent.run("a").result().await.unwrap();
        let second = agent.resume(first.conversation, "b").result().await.unwrap();

        let system_count = second
            .conversation
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(second.conversation.messages.len(), 5);
        assert_eq!(second.text, "two");
    }

    #[tokio::test]
    async fn conversation_carries_tools_and_output_cap() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::text("ok")]));
        operative(&client)
            .with_budget(Budget::default().with_max_tokens_per_turn(256))
            .run("hi")
            .result()
            .await
            .unwrap();

        let seen = &client.conversations()[0];
        assert_eq!(seen.max_output_tokens, Some(256));
        let names: Vec<&str> = seen.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail", "slow"]);
    }

    #[tokio::test]
    async fn thinking_precedes_text() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::reasoned("hmm", "answer")]));
        let ops = operative(&client).run("q").collect_all().await;
        assert_eq!(
            kinds(&ops),
            vec!["turn_started", "thinking", "text", "turn_completed", "completed"]
        );
    }

    #[tokio::test]
    async fn model_error_stops_run() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::Error(ModelError::Network(
            "connection reset".into(),
        ))]));
        let ops = operative(&client).run("q").collect_all().await;
        assert_eq!(
            stop_reason(&ops),
            Some(&StopReason::ExplicitStop(
                "model error: Network error: connection reset".into()
            ))
        );
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::call("fail", json!({}), "c1"),
            Reply::text("recovered"),
        ]));
        let ops = operative(&client).run("q").collect_all().await;

        let failure = ops
            .iter()
            .find_map(|op| match op {
                Operation::ToolFailed { error, .. } => Some(error.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(failure.message, "Tool execution failed: fail: boom");

        let second_call = &client.conversations()[1];
        let last = second_call.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.text(), "Error: Tool execution failed: fail: boom");
        assert!(matches!(ops.last(), Some(Operation::Completed(_))));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_per_call_failures() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::ToolCalls(vec![
                ToolRequest::new("nope", "{}", "c1"),
                ToolRequest::new("echo", "{broken", "c2"),
                ToolRequest::new("echo", r#"{"message":"fine"}"#, "c3"),
            ]),
            Reply::text("done"),
        ]));
        let ops = operative(&client).run("q").collect_all().await;
        let failed = ops
            .iter()
            .filter(|op| matches!(op, Operation::ToolFailed { .. }))
            .count();
        let completed = ops
            .iter()
            .filter(|op| matches!(op, Operation::ToolCompleted { .. }))
            .count();
        assert_eq!((failed, completed), (2, 1));
        assert!(matches!(ops.last(), Some(Operation::Completed(_))));
        assert!(client.conversations()[1].tool_results_are_paired());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_tool_error_aborts_siblings() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::ToolCalls(vec![
            ToolRequest::new("slow", "{}", "c1"),
            ToolRequest::new("fail", "{}", "c2"),
        ])]));
        let ops = operative(&client)
            .with_middleware(ErrorPolicy::new(vec!["fail".into()]))
            .run("q")
            .collect_all()
            .await;

        assert_eq!(
            stop_reason(&ops),
            Some(&StopReason::ExplicitStop("Tool execution failed: fail: boom".into()))
        );
        assert!(!ops.iter().any(|op| matches!(op, Operation::ToolCompleted { .. })));
        assert_eq!(client.call_count(), 1);
    }

    struct FailingHook {
        stage: &'static str,
    }

    #[async_trait]
    impl Middleware for FailingHook {
        async fn after_response(&self, _ctx: &mut ResponseContext) -> Result<(), MiddlewareError> {
            if self.stage == "after_response" {
                return Err("response vetoed".into());
            }
            Ok(())
        }

        async fn before_tool_calls(
            &self,
            _calls: &mut [ToolCallContext],
        ) -> Result<(), MiddlewareError> {
            if self.stage == "before_tool_calls" {
                return Err("approval service down".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn after_response_error_stops_run() {
        let client = Arc::new(ScriptedClient::new(vec![Reply::text("hi")]));
        let ops = operative(&client)
            .with_middleware(FailingHook {
                stage: "after_response",
            })
            .run("q")
            .collect_all()
            .await;
        assert_eq!(kinds(&ops), vec!["turn_started", "stopped"]);
        assert_eq!(
            stop_reason(&ops),
            Some(&StopReason::ExplicitStop("response vetoed".into()))
        );
    }

    #[tokio::test]
    async fn before_tool_calls_error_is_discarded() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::call("echo", json!({"message": "ping"}), "c1"),
            Reply::text("pong"),
        ]));
        let result = operative(&client)
            .with_middleware(FailingHook {
                stage: "before_tool_calls",
            })
            .run("q")
            .result()
            .await
            .unwrap();
        assert_eq!(result.text, "pong");
    }

    struct RenameCalls;

    #[async_trait]
    impl Middleware for RenameCalls {
        async fn after_response(&self, ctx: &mut ResponseContext) -> Result<(), MiddlewareError> {
            ctx.tool_calls.retain(|c| c.name != "fail");
            Ok(())
        }

        async fn before_tool_calls(
            &self,
            calls: &mut [ToolCallContext],
        ) -> Result<(), MiddlewareError> {
            for call in calls.iter_mut() {
                call.modify(r#"{"message":"modified"}"#);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn middleware_can_filter_and_rewrite_calls() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::ToolCalls(vec![
                ToolRequest::new("echo", r#"{"message":"original"}"#, "c1"),
                ToolRequest::new("fail", "{}", "c2"),
            ]),
            Reply::text("done"),
        ]));
        let ops = operative(&client)
            .with_middleware(RenameCalls)
            .run("q")
            .collect_all()
            .await;

        let requested = ops
            .iter()
            .find_map(|op| match op {
                Operation::ToolsRequested(calls) => Some(calls.len()),
                _ => None,
            })
            .unwrap();
        assert_eq!(requested, 1);

        let output = ops
            .iter()
            .find_map(|op| match op {
                Operation::ToolCompleted { output, .. } => Some(output.content.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(output, "modified");
    }

    #[tokio::test]
    async fn pressure_is_emitted_each_turn() {
        let client = Arc::new(
            ScriptedClient::new(vec![
                Reply::call("echo", json!({"message": "x"}), "c1"),
                Reply::text("done"),
            ])
            .with_usage(TokenUsage::from_counts(60, 30)),
        );
        let ops = operative(&client)
            .with_budget(Budget::default().with_max_tokens(1_000).with_context_window(70))
            .with_middleware(LoggingMiddleware)
            .run("q")
            .collect_all()
            .await;

        let pressure: Vec<&PressureInfo> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::Pressure(info) => Some(info),
                _ => None,
            })
            .collect();
        assert_eq!(pressure.len(), 2);
        assert!(
            pressure
                .iter()
                .all(|p| p.dimension == operative_core::PressureDimension::ContextWindow)
        );
        assert_eq!(pressure[0].current, 60);
    }

    #[derive(Default)]
    struct PressureRecorder {
        seen: std::sync::Mutex<Vec<Vec<PressureInfo>>>,
    }

    #[async_trait]
    impl Middleware for Arc<PressureRecorder> {
        async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
            self.seen.lock().unwrap().push(ctx.pressure.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn pressure_reaches_the_next_request() {
        let client = Arc::new(
            ScriptedClient::new(vec![
                Reply::call("echo", json!({"message": "x"}), "c1"),
                Reply::text("done"),
            ])
            .with_usage(TokenUsage::from_counts(60, 30)),
        );
        let recorder = Arc::new(PressureRecorder::default());
        let result = operative(&client)
            .with_budget(Budget::default().with_max_tokens(100))
            .with_middleware(recorder.clone())
            .run("q")
            .result()
            .await
            .unwrap();
        assert_eq!(result.turns_used, 2);

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].len(), 1);
        assert_eq!(
            seen[1][0].dimension,
            operative_core::PressureDimension::TokenBudget
        );
        assert_eq!(seen[1][0].current, 90);
        assert_eq!(seen[1][0].limit, 100);
    }

    #[tokio::test]
    async fn compaction_shrinks_the_next_request() {
        let client = Arc::new(
            ScriptedClient::new(vec![
                Reply::call("echo", json!({"message": "x"}), "c1"),
                Reply::text("done"),
            ])
            .with_usage(TokenUsage::from_counts(140, 5)),
        );
        let mut history = Conversation::new();
        history.push(Message::user("old question ".repeat(40)));
        history.push(Message::assistant("old answer ".repeat(40)));

        let result = Operative::new(client.clone(), ToolRegistry::new().with(EchoTool))
            .with_budget(Budget::default().with_context_window(150))
            .with_middleware(crate::middleware::PressureCompaction::default())
            .resume(history, "latest")
            .result()
            .await
            .unwrap();
        assert_eq!(result.text, "done");

        let seen = client.conversations();
        assert_eq!(seen.len(), 2);
        let is_old = |m: &Message| m.text().starts_with("old");
        assert_eq!(seen[0].messages.iter().filter(|m| is_old(*m)).count(), 2);
        assert!(!seen[1].messages.iter().any(is_old));
        assert!(seen[1].messages.iter().any(|m| m.text() == "latest"));
        assert!(seen[1].tool_results_are_paired());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_hits_timeout() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::text("late").delayed(Duration::from_secs(10)),
        ]));
        let ops = operative(&client)
            .with_budget(Budget::default().with_timeout(Duration::from_secs(2)))
            .run("q")
            .collect_all()
            .await;
        assert_eq!(kinds(&ops), vec!["turn_started", "stopped"]);
        assert_eq!(stop_reason(&ops), Some(&StopReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tools_count_against_timeout() {
        let client = Arc::new(ScriptedClient::repeating(Reply::call("slow", json!({}), "c1")));
        let ops = operative(&client)
            .with_budget(Budget::default().with_timeout(Duration::from_secs(45)))
            .run("q")
            .collect_all()
            .await;
        // Two 30s tool calls; the budget check before turn 3 sees 60s elapsed.
        assert_eq!(stop_reason(&ops), Some(&StopReason::Timeout));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_run() {
        let client = Arc::new(ScriptedClient::repeating(Reply::call(
            "echo",
            json!({"message": "again"}),
            "c1",
        )));
        let mut stream = operative(&client).with_channel_capacity(1).run("q");
        let first = futures::StreamExt::next(&mut stream).await;
        assert!(matches!(first, Some(Operation::TurnStarted { turn: 1, .. })));
        drop(stream);

        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        let settled = client.call_count();
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        assert_eq!(client.call_count(), settled);
        assert!(settled <= 2);
    }

    #[tokio::test]
    async fn from_config_installs_policies() {
        let config = OperativeConfig::from_toml_str(
            r#"
            system_prompt = "configured"

            [budget]
            max_turns = 3

            [tools]
            deny = ["fail"]
            "#,
        )
        .unwrap();
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::call("fail", json!({}), "c1"),
            Reply::text("ok"),
        ]));
        let agent = Operative::from_config(&config, client.clone(), registry());
        assert_eq!(agent.budget().max_turns, Some(3));

        let ops = agent.run("q").collect_all().await;
        let rejected = ops
            .iter()
            .find_map(|op| match op {
                Operation::ToolsRejected(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(rejected[0].reason, "tool 'fail' is on the deny list");
        assert_eq!(client.conversations()[0].messages[0].text(), "configured");
    }
}
