// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Step combinator algebra.
//!
//! A [`Step<I, O>`] is an async function from `I` to `O`.  The declarative
//! composition layer is syntactic sugar over the combinators here: [`Chain`],
//! [`Parallel`], [`Race`], [`Map`], [`Reduce`], [`Gate`].  Within a turn,
//! steps execute sequentially in source order unless a combinator explicitly
//! forks.  Every combinator checkpoints cancellation on entry.
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;

use murmur_config::ModelConfiguration;
use murmur_model::{CompletionRequest, LanguageModelProvider, Message};

use crate::bus::{names, Event, EventBus, EventScope};
use crate::cancel::check_cancellation;
use crate::pipeline::{InvocationLedger, ToolPipeline};

/// An async transformation from `I` to `O`.
///
/// Implemented for any `Fn(I) -> impl Future<Output = anyhow::Result<O>>`,
/// so plain async closures compose directly with the named combinators.
#[async_trait]
pub trait Step<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<O>;
}

#[async_trait]
impl<I, O, F, Fut> Step<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<O>> + Send,
{
    async fn run(&self, input: I) -> anyhow::Result<O> {
        (self)(input).await
    }
}

pub type BoxedStep<I, O> = Arc<dyn Step<I, O>>;

/// A named wrapper around a pure async transformation.
///
/// Functionally identical to registering the closure directly; exists so
/// compositions read uniformly (`Transform` → `Chain` → `Gate` …).
pub struct Transform<F> {
    f: F,
}

impl<F> Transform<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<I, O, F, Fut> Step<I, O> for Transform<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<O>> + Send,
{
    async fn run(&self, input: I) -> anyhow::Result<O> {
        check_cancellation()?;
        (self.f)(input).await
    }
}

/// Feed the first step's output into the second.
pub struct Chain<I, M, O> {
    first: BoxedStep<I, M>,
    second: BoxedStep<M, O>,
}

impl<I, M, O> Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    pub fn new(first: impl Step<I, M> + 'static, second: impl Step<M, O> + 'static) -> Self {
        Self {
            first: Arc::new(first),
            second: Arc::new(second),
        }
    }
}

#[async_trait]
impl<I, M, O> Step<I, O> for Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<O> {
        check_cancellation()?;
        let mid = self.first.run(input).await?;
        check_cancellation()?;
        self.second.run(mid).await
    }
}

/// Apply the inner step to every item concurrently, preserving order.
pub struct Map<I, O> {
    inner: BoxedStep<I, O>,
}

impl<I, O> Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(inner: impl Step<I, O> + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<I, O> Step<Vec<I>, Vec<O>> for Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: Vec<I>) -> anyhow::Result<Vec<O>> {
        check_cancellation()?;
        let runs = input.into_iter().map(|item| self.inner.run(item));
        join_all(runs).await.into_iter().collect()
    }
}

/// Fold a vector into an accumulator, left to right.
pub struct Reduce<I, A> {
    init: A,
    fold: Arc<dyn Fn(A, I) -> anyhow::Result<A> + Send + Sync>,
}

impl<I, A> Reduce<I, A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn new(init: A, fold: impl Fn(A, I) -> anyhow::Result<A> + Send + Sync + 'static) -> Self {
        Self {
            init,
            fold: Arc::new(fold),
        }
    }
}

#[async_trait]
impl<I, A> Step<Vec<I>, A> for Reduce<I, A>
where
    I: Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    async fn run(&self, input: Vec<I>) -> anyhow::Result<A> {
        check_cancellation()?;
        let mut acc = self.init.clone();
        for item in input {
            acc = (self.fold)(acc, item)?;
        }
        Ok(acc)
    }
}

/// Run both branches on the same input; the first `Ok` wins.
///
/// When the first branch to finish fails, the other branch's result decides.
pub struct Race<I, O> {
    left: BoxedStep<I, O>,
    right: BoxedStep<I, O>,
}

impl<I, O> Race<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(left: impl Step<I, O> + 'static, right: impl Step<I, O> + 'static) -> Self {
        Self {
            left: Arc::new(left),
            right: Arc::new(right),
        }
    }
}

#[async_trait]
impl<I, O> Step<I, O> for Race<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<O> {
        check_cancellation()?;
        // Both trait calls yield the same boxed-future type, so the select
        // arms are symmetric.
        let race = futures::future::select(self.left.run(input.clone()), self.right.run(input));
        match race.await {
            futures::future::Either::Left((first, other))
            | futures::future::Either::Right((first, other)) => match first {
                Ok(out) => Ok(out),
                Err(_) => other.await,
            },
        }
    }
}

/// Run both branches on the same input and join their outputs.
pub struct Parallel<I, A, B> {
    left: BoxedStep<I, A>,
    right: BoxedStep<I, B>,
}

impl<I, A, B> Parallel<I, A, B>
where
    I: Clone + Send + Sync + 'static,
    A: Send + 'static,
    B: Send + 'static,
{
    pub fn new(left: impl Step<I, A> + 'static, right: impl Step<I, B> + 'static) -> Self {
        Self {
            left: Arc::new(left),
            right: Arc::new(right),
        }
    }
}

#[async_trait]
impl<I, A, B> Step<I, (A, B)> for Parallel<I, A, B>
where
    I: Clone + Send + Sync + 'static,
    A: Send + 'static,
    B: Send + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<(A, B)> {
        check_cancellation()?;
        tokio::try_join!(self.left.run(input.clone()), self.right.run(input))
    }
}

/// Pass the input through when the predicate holds; fail otherwise.
pub struct Gate<I> {
    predicate: Arc<dyn Fn(&I) -> bool + Send + Sync>,
    reason: String,
}

impl<I> Gate<I> {
    pub fn new(
        reason: impl Into<String>,
        predicate: impl Fn(&I) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<I> Step<I, I> for Gate<I>
where
    I: Send + Sync + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<I> {
        check_cancellation()?;
        if (self.predicate)(&input) {
            Ok(input)
        } else {
            anyhow::bail!("gate rejected input: {}", self.reason)
        }
    }
}

/// Wrap a step with `stepStarted` / `stepCompleted` events on the bus.
pub struct Monitor<I, O> {
    inner: BoxedStep<I, O>,
    bus: Arc<EventBus>,
    name: String,
}

impl<I, O> Monitor<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        bus: Arc<EventBus>,
        inner: impl Step<I, O> + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(inner),
            bus,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<I, O> Step<I, O> for Monitor<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> anyhow::Result<O> {
        check_cancellation()?;
        self.bus
            .emit(
                Event::new(names::STEP_STARTED)
                    .with_source(self.name.clone())
                    .with_scope(EventScope::Step),
            )
            .await;
        let result = self.inner.run(input).await;
        self.bus
            .emit(
                Event::new(names::STEP_COMPLETED)
                    .with_source(self.name.clone())
                    .with_scope(EventScope::Step)
                    .with_value(json!({ "ok": result.is_ok() })),
            )
            .await;
        result
    }
}

/// One model completion: user text in, assistant text out.
pub struct Infer {
    provider: Arc<dyn LanguageModelProvider>,
    options: ModelConfiguration,
    instructions: Option<String>,
}

impl Infer {
    pub fn new(provider: Arc<dyn LanguageModelProvider>) -> Self {
        Self {
            provider,
            options: ModelConfiguration::default(),
            instructions: None,
        }
    }

    pub fn with_options(mut self, options: ModelConfiguration) -> Self {
        self.options = options;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

#[async_trait]
impl Step<String, String> for Infer {
    async fn run(&self, input: String) -> anyhow::Result<String> {
        check_cancellation()?;
        let mut messages = Vec::with_capacity(2);
        if let Some(instructions) = &self.instructions {
            messages.push(Message::system(instructions.clone()));
        }
        messages.push(Message::user(input));
        self.provider
            .complete_text(CompletionRequest {
                messages,
                options: self.options.clone(),
                stream: true,
            })
            .await
    }
}

/// One tool invocation through the full pipeline.  Input is the raw argument
/// JSON text; output is the tool's rendered content.
pub struct InvokeTool {
    pipeline: Arc<ToolPipeline>,
    ledger: Arc<InvocationLedger>,
    tool: String,
    session_id: String,
}

impl InvokeTool {
    pub fn new(
        pipeline: Arc<ToolPipeline>,
        ledger: Arc<InvocationLedger>,
        tool: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            ledger,
            tool: tool.into(),
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl Step<String, String> for InvokeTool {
    async fn run(&self, input: String) -> anyhow::Result<String> {
        check_cancellation()?;
        let call_id = uuid::Uuid::new_v4().to_string();
        let output = self
            .pipeline
            .execute(&call_id, &self.tool, input, &self.session_id, &self.ledger)
            .await?;
        Ok(output.content)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cancel::{with_cancellation, TurnCancellationToken};

    fn double() -> impl Step<i64, i64> {
        |x: i64| async move { Ok(x * 2) }
    }

    #[tokio::test]
    async fn closures_are_steps() {
        assert_eq!(double().run(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn transform_wraps_a_closure() {
        let step = Transform::new(|x: i64| async move { Ok(x - 1) });
        assert_eq!(step.run(10).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn chain_composes_in_order() {
        let step = Chain::new(double(), |x: i64| async move { Ok(format!("={x}")) });
        assert_eq!(step.run(4).await.unwrap(), "=8");
    }

    #[tokio::test]
    async fn map_preserves_order_and_runs_concurrently() {
        let slow = |x: i64| async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(x + 1)
        };
        let step = Map::new(slow);
        let start = Instant::now();
        let out = step.run(vec![1, 2, 3]).await.unwrap();
        assert_eq!(out, vec![2, 3, 4]);
        assert!(start.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test]
    async fn map_propagates_errors() {
        let step = Map::new(|x: i64| async move {
            if x == 2 {
                anyhow::bail!("two is right out")
            }
            Ok(x)
        });
        assert!(step.run(vec![1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn reduce_folds_left_to_right() {
        let step = Reduce::new(String::new(), |mut acc: String, item: i64| {
            acc.push_str(&item.to_string());
            Ok(acc)
        });
        assert_eq!(step.run(vec![1, 2, 3]).await.unwrap(), "123");
    }

    #[tokio::test]
    async fn race_returns_first_ok() {
        let fast = |_: i64| async move { Ok("fast") };
        let slow = |_: i64| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("slow")
        };
        let step = Race::new(fast, slow);
        let start = Instant::now();
        assert_eq!(step.run(0).await.unwrap(), "fast");
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn race_falls_back_when_first_finisher_fails() {
        let failing = |_: i64| async move { anyhow::bail!("lost") };
        let slow_ok = |_: i64| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("winner")
        };
        let step: Race<i64, &str> = Race::new(failing, slow_ok);
        assert_eq!(step.run(0).await.unwrap(), "winner");
    }

    #[tokio::test]
    async fn parallel_joins_both_outputs() {
        let step = Parallel::new(double(), |x: i64| async move { Ok(x + 100) });
        assert_eq!(step.run(1).await.unwrap(), (2, 101));
    }

    #[tokio::test]
    async fn gate_passes_and_rejects() {
        let step = Gate::new("must be positive", |x: &i64| *x > 0);
        assert_eq!(step.run(5).await.unwrap(), 5);
        let err = step.run(-1).await.unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[tokio::test]
    async fn monitor_emits_started_and_completed() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for name in [names::STEP_STARTED, names::STEP_COMPLETED] {
            let seen = Arc::clone(&seen);
            bus.on(name, move |e: Event| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(e.name);
                }
            });
        }
        let step = Monitor::new("work", Arc::clone(&bus), double());
        step.run(1).await.unwrap();
        let events = seen.lock().unwrap().clone();
        assert_eq!(events, vec![names::STEP_STARTED, names::STEP_COMPLETED]);
    }

    #[tokio::test]
    async fn steps_fail_fast_when_turn_is_cancelled() {
        let token = TurnCancellationToken::new();
        token.cancel();
        let step = Chain::new(double(), double());
        let result = with_cancellation(token, step.run(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn infer_calls_the_provider() {
        let provider = Arc::new(murmur_model::MockProvider);
        let step = Infer::new(provider).with_instructions("be brief");
        let out = step.run("hello".into()).await.unwrap();
        assert_eq!(out, "MOCK: hello");
    }
}
