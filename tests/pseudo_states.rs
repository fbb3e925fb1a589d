//! Coverage for two declarative operations no other scenario test
//! exercises: `sub_final` (a terminal child marking region completion) and
//! `jump_param` (a jump clause that forwards the last user event's
//! parameter when its name matches).

mod support;

use std::sync::Arc;

use vivid_hsm::{Builder, Chart, Param, QueueMode};

use support::TestBinding;

#[derive(Default)]
struct FinalCtx {
    trace: Vec<&'static str>,
}

fn final_root(b: &mut Builder<'_, FinalCtx>) {
    b.sub_state("running", |b| {
        b.on_entry(|ctx| ctx.trace.push("enter:running"));
        b.on_exit(|ctx| ctx.trace.push("exit:running"));
        b.on_event("ev_finish", |_ctx| true, Some("done"), |_ctx| {});
    });
    b.sub_final("done", |b| {
        b.on_entry(|ctx| ctx.trace.push("enter:done"));
    });
    b.default("running");
}

#[test]
fn transitioning_into_a_final_state_counts_as_a_real_state_change() {
    let binding = Arc::new(TestBinding::new());
    let mut chart = Chart::new(binding, QueueMode::Mutex, 8, final_root, FinalCtx::default()).unwrap();
    chart.pump();
    assert!(chart.is_in("running"));

    let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired_for_cb = fired.clone();
    chart.set_state_change_callback(move |_ctx| fired_for_cb.store(true, std::sync::atomic::Ordering::Release));

    chart.queue_event("ev_finish", Param::None).unwrap();
    chart.pump();

    assert!(
        fired.load(std::sync::atomic::Ordering::Acquire),
        "entering a STATE_FINAL target is a real state change"
    );
    assert!(chart.is_in("done"));
    assert!(!chart.is_in("running"));
    assert_eq!(chart.context().trace, vec!["enter:running", "exit:running", "enter:done"]);
}

#[derive(Default)]
struct RouterCtx {
    last_route: Option<i32>,
    mismatches: u32,
}

fn router_root(b: &mut Builder<'_, RouterCtx>) {
    b.sub_state("idle", |b| {
        b.on_event_param("ev_route", |_ctx, _param| true, Some("junction"), |_ctx, _param| {});
    });
    b.sub_junction("junction", |b| {
        // Only honors the parameter when it arrived on "ev_route"; any other
        // last-event name falls through with no parameter, landing on
        // "unmatched" instead.
        b.jump_param(
            "ev_route",
            |_ctx, param| param.downcast_ref::<i32>().is_some(),
            "matched",
            |ctx, param| ctx.last_route = param.downcast_ref::<i32>().copied(),
        );
        b.jump(|_ctx| true, "unmatched", |ctx| ctx.mismatches += 1);
    });
    b.sub_state("matched", |_| {});
    b.sub_state("unmatched", |_| {});
    b.default("idle");
}

#[test]
fn jump_param_forwards_the_last_event_parameter_when_names_match() {
    let binding = Arc::new(TestBinding::new());
    let mut chart = Chart::new(binding, QueueMode::Mutex, 8, router_root, RouterCtx::default()).unwrap();
    chart.pump();

    chart.queue_event("ev_route", Param::boxed(42i32)).unwrap();
    chart.pump();

    assert!(chart.is_in("matched"));
    assert_eq!(chart.context().last_route, Some(42));
    assert_eq!(chart.context().mismatches, 0);
}

#[test]
fn jump_param_clause_is_skipped_when_the_last_event_name_does_not_match() {
    // Same event name, but a payload the guard rejects (not an i32), so the
    // param-forwarding clause's guard fails and control falls through to the
    // unconditional clause instead.
    let binding = Arc::new(TestBinding::new());
    let mut chart = Chart::new(binding, QueueMode::Mutex, 8, router_root, RouterCtx::default()).unwrap();
    chart.pump();

    chart.queue_event("ev_route", Param::None).unwrap();
    chart.pump();

    assert!(chart.is_in("unmatched"));
    assert_eq!(chart.context().mismatches, 1);
    assert_eq!(chart.context().last_route, None);
}
