use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::*;
use crate::error::TransferError;

#[derive(Default)]
struct Ctx {
    log: Mutex<Vec<&'static str>>,
    block_calls: AtomicU32,
    fail_calls: AtomicU32,
    cancelled: AtomicBool,
    wake: Notify,
}

type C = Arc<Ctx>;

impl Ctx {
    fn record(&self, name: &'static str) {
        self.log.lock().unwrap().push(name);
    }

    fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

fn first(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.record("first");
        Ok(())
    })
}

fn last(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.record("last");
        Ok(())
    })
}

/// Never finishes on its first call; succeeds afterwards.
fn block_once(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.record("block");
        if ctx.block_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(())
    })
}

fn fail_once(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.record("fail");
        if ctx.fail_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(TransferError::Precondition("boom".into()));
        }
        Ok(())
    })
}

/// Waits for its cancel hook, then reports a cooperative stop.
fn cooperative(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.record("cooperative");
        let woken = ctx.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();
        if !ctx.cancelled.load(Ordering::SeqCst) {
            woken.await;
        }
        Err(TransferError::Stopped)
    })
}

fn cancel_cooperative(ctx: C) -> StepFuture {
    Box::pin(async move {
        ctx.cancelled.store(true, Ordering::SeqCst);
        ctx.wake.notify_waiters();
        Ok(())
    })
}

async fn wait_for_step(runner: &StepRunner<C>, name: &'static str) {
    let mut rx = runner.subscribe();
    rx.wait_for(|c| c.step == Some(name)).await.unwrap();
}

#[tokio::test]
async fn runs_in_order_then_noop() {
    let runner = StepRunner::new(vec![Step::new("first", first), Step::new("last", last)]);
    let ctx = C::default();
    assert_eq!(runner.status(), StepStatus::Created);
    assert_eq!(runner.run(ctx.clone()).await.unwrap(), StepStatus::Finished);
    assert_eq!(ctx.log(), vec!["first", "last"]);
    assert_eq!(runner.run(ctx.clone()).await.unwrap(), StepStatus::Finished);
    assert_eq!(ctx.log().len(), 2);
    assert_eq!(runner.completed_steps(), vec!["first", "last"]);
}

#[tokio::test]
async fn stop_then_resume_skips_completed() {
    let runner = Arc::new(StepRunner::new(vec![
        Step::new("first", first),
        Step::new("block", block_once),
        Step::new("last", last),
    ]));
    let ctx = C::default();

    let handle = {
        let runner = runner.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { runner.run(ctx).await })
    };
    wait_for_step(&runner, "block").await;
    runner.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);
    assert_eq!(runner.status(), StepStatus::Stopped);
    assert!(runner.last_error().is_none());
    assert_eq!(runner.completed_steps(), vec!["first"]);

    assert_eq!(runner.run(ctx.clone()).await.unwrap(), StepStatus::Finished);
    assert_eq!(ctx.log(), vec!["first", "block", "block", "last"]);
}

#[tokio::test]
async fn failed_step_reruns_on_retry() {
    let runner = StepRunner::new(vec![
        Step::new("first", first),
        Step::new("fail", fail_once),
        Step::new("last", last),
    ]);
    let ctx = C::default();
    let err = runner.run(ctx.clone()).await.unwrap_err();
    assert!(matches!(err, TransferError::Precondition(_)));
    assert_eq!(runner.status(), StepStatus::Stopped);
    assert!(runner.last_error().unwrap().contains("boom"));
    assert!(!runner.is_completed("fail"));

    assert_eq!(runner.run(ctx.clone()).await.unwrap(), StepStatus::Finished);
    assert!(runner.last_error().is_none());
    assert_eq!(ctx.log(), vec!["first", "fail", "fail", "last"]);
}

#[tokio::test]
async fn cancel_hook_winds_down_step() {
    let runner = Arc::new(StepRunner::new(vec![
        Step::new("cooperative", cooperative).with_cancel(cancel_cooperative),
        Step::new("last", last),
    ]));
    let ctx = C::default();
    let handle = {
        let runner = runner.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { runner.run(ctx).await })
    };
    wait_for_step(&runner, "cooperative").await;
    runner.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);
    assert!(ctx.cancelled.load(Ordering::SeqCst));
    assert_eq!(ctx.log(), vec!["cooperative"]);
}

#[tokio::test]
async fn stop_when_idle_is_noop() {
    let runner = StepRunner::new(vec![Step::new("first", first)]);
    runner.stop().await;
    assert_eq!(runner.status(), StepStatus::Created);
}

#[tokio::test]
async fn status_changes_are_published() {
    let runner = StepRunner::new(vec![Step::new("fail", fail_once)]);
    let mut rx = runner.subscribe();
    let ctx = C::default();
    let _ = runner.run(ctx).await;
    let change = rx.borrow_and_update().clone();
    assert_eq!(change.status, StepStatus::Stopped);
    assert!(change.error.unwrap().contains("boom"));
}
