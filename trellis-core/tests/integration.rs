//! Integration Tests for the Reactive Engine
//!
//! These tests verify that wrapping, cells, derived values, and
//! computations work together correctly across module boundaries.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use trellis_core::observe::{is_readonly, is_wrapped, unwrap, Handle, WriteOutcome};
use trellis_core::reactive::{cells_from_record, is_cell, ComputationOptions, Runtime};
use trellis_core::value::{NativeFn, Pattern, PendingTask, Record, Value};

fn handle_of(value: &Value) -> Handle {
    value.as_handle().expect("structured values wrap").clone()
}

/// Wrapping is idempotent and identity-preserving.
#[test]
fn wrap_identity_properties() {
    let runtime = Runtime::new();
    let raw = Value::record([("x", Value::number(1.0))]);

    let once = runtime.wrap(raw.clone());
    let twice = runtime.wrap(raw.clone());
    assert_eq!(once, twice);

    // Wrapping a wrapper returns it unchanged.
    assert_eq!(runtime.wrap(once.clone()), once);

    // Unwrap recovers the raw value; non-wrapped values pass through.
    assert_eq!(unwrap(once), raw);
    assert_eq!(unwrap(raw.clone()), raw);
}

/// Values outside the four container shapes never wrap.
#[test]
fn non_observable_values_pass_through() {
    let runtime = Runtime::new();

    let diagnostic_cases = [
        Value::number(1.0),
        Value::text("hello"),
        Value::Bool(true),
        Value::Null,
        Value::atom("tag"),
        Value::Func(NativeFn::new("id", |args| {
            args.first().cloned().unwrap_or(Value::Null)
        })),
    ];
    for value in diagnostic_cases {
        assert_eq!(runtime.wrap(value.clone()), value);
    }

    // Opaque built-ins are no-ops too, silently.
    let opaque_cases = [
        Value::Instant(std::time::SystemTime::UNIX_EPOCH),
        Value::Pattern(Pattern::new("ab?")),
        Value::Pending(PendingTask::new()),
    ];
    for value in opaque_cases {
        let wrapped = runtime.wrap(value.clone());
        assert_eq!(wrapped, value);
        assert!(!is_wrapped(&wrapped));
    }
}

/// Mutations through a handle land on the caller-owned raw value.
#[test]
fn mutations_pass_through() {
    let runtime = Runtime::new();
    let raw = Record::from_entries([("foo", Value::number(1.0))]);
    let handle = handle_of(&runtime.wrap(Value::Record(raw.clone())));

    handle.set("foo", Value::number(2.0)).expect("write");
    assert_eq!(raw.get("foo"), Some(Value::number(2.0)));

    handle.remove("foo");
    assert!(!raw.contains_key("foo"));
}

/// Structured reads come back wrapped, lazily.
#[test]
fn nested_values_wrap_on_read() {
    let runtime = Runtime::new();

    let record = runtime.wrap(Value::record([(
        "a",
        Value::record([("b", Value::number(1.0))]),
    )]));
    let record = handle_of(&record);
    assert!(is_wrapped(&record.get("a")));

    let list = runtime.wrap(Value::list([Value::record([("a", Value::number(1.0))])]));
    let list = handle_of(&list);
    assert!(is_wrapped(&list.get(0usize)));
}

/// A computation re-runs exactly once per meaningful change.
#[test]
fn computation_reruns_once_per_change() {
    let runtime = Runtime::new();
    let state = handle_of(&runtime.wrap(Value::record([("x", Value::number(1.0))])));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _computation = runtime.create_computation(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            state_clone.get("x")
        },
        ComputationOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("x", Value::number(2.0)).expect("write");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Writing an equal value changes nothing.
    state.set("x", Value::number(2.0)).expect("write");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Derived values recompute before ordinary observers run, so an observer
/// never sees a stale cached value after a mutation.
#[test]
fn derived_values_refresh_before_observers() {
    let runtime = Runtime::new();
    let state = handle_of(&runtime.wrap(Value::record([("x", Value::number(1.0))])));

    let doubled = {
        let state = state.clone();
        runtime.derive(move || {
            Value::number(state.get("x").as_number().unwrap_or(0.0) * 2.0)
        })
    };

    let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let observer_runs = Arc::new(AtomicI32::new(0));
    {
        let seen_inner = seen.clone();
        let observer_runs_inner = observer_runs.clone();
        let doubled = doubled.clone();
        let _observer = runtime.create_computation(
            move || {
                observer_runs_inner.fetch_add(1, Ordering::SeqCst);
                let value = doubled.get();
                seen_inner.lock().unwrap().push(value.as_number().unwrap_or(f64::NAN));
                value
            },
            ComputationOptions::default(),
        );

        assert_eq!(seen.lock().unwrap().as_slice(), &[2.0]);

        state.set("x", Value::number(5.0)).expect("write");
        assert_eq!(observer_runs.load(Ordering::SeqCst), 2);
        assert_eq!(seen.lock().unwrap().as_slice(), &[2.0, 10.0]);
    }
}

/// Boxed cell basics, including the no-nesting rule.
#[test]
fn boxed_cell_properties() {
    let runtime = Runtime::new();

    let cell = runtime.cell(Value::number(1.0));
    assert!(is_cell(&Value::Cell(cell.clone())));
    assert_eq!(cell.get(), Value::number(1.0));

    cell.set(Value::number(2.0)).expect("slot write");
    assert_eq!(cell.get(), Value::number(2.0));

    let reboxed = runtime.cell(Value::Cell(cell.clone()));
    assert_eq!(reboxed.id(), cell.id());

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let cell_clone = cell.clone();
    let _computation = runtime.create_computation(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            cell_clone.get()
        },
        ComputationOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    cell.set(Value::number(3.0)).expect("slot write");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A cell stored in a record auto-unwraps on read and absorbs writes.
#[test]
fn cells_auto_unwrap_through_wrappers() {
    let runtime = Runtime::new();
    let cell = runtime.cell(Value::number(1.0));

    let raw = Record::new();
    raw.insert("slot", Value::Cell(cell.clone()));
    let handle = handle_of(&runtime.wrap(Value::Record(raw.clone())));

    // Read through the wrapper sees the slot value, not the cell.
    assert_eq!(handle.get("slot"), Value::number(1.0));

    // A non-cell write lands inside the cell; the raw field still holds it.
    handle.set("slot", Value::number(7.0)).expect("write");
    assert_eq!(cell.get_untracked(), Value::number(7.0));
    assert!(matches!(raw.get("slot"), Some(Value::Cell(_))));

    // Direct cell reads never auto-unwrap further.
    assert_eq!(cell.get_untracked(), Value::number(7.0));
}

/// Field projection: cells pass through to the source record both ways.
#[test]
fn field_projection_round_trips() {
    let runtime = Runtime::new();
    let source = handle_of(&runtime.wrap(Value::record([
        ("x", Value::number(1.0)),
        ("y", Value::number(2.0)),
    ])));
    let fields = cells_from_record(&source);

    assert_eq!(fields["x"].get(), Value::number(1.0));

    source.set("x", Value::number(5.0)).expect("write");
    assert_eq!(fields["x"].get(), Value::number(5.0));

    fields["y"].set(Value::number(9.0)).expect("field write");
    assert_eq!(source.get("y"), Value::number(9.0));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let x = fields["x"].clone();
    let _computation = runtime.create_computation(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            x.get()
        },
        ComputationOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    source.set("x", Value::number(6.0)).expect("write");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// After stop, former dependencies never invoke the computation again.
#[test]
fn stopped_computations_stay_stopped() {
    let runtime = Runtime::new();
    let state = handle_of(&runtime.wrap(Value::record([("x", Value::number(1.0))])));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let computation = runtime.create_computation(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            state_clone.get("x")
        },
        ComputationOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    computation.stop();

    state.set("x", Value::number(2.0)).expect("write");
    state.set("x", Value::number(3.0)).expect("write");
    state.remove("x");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Read-only handles reject mutation without failing and wrap nested reads
/// read-only; a read-only wrapper is distinct from the mutable one.
#[test]
fn readonly_wrappers_end_to_end() {
    let runtime = Runtime::new();
    let raw = Value::record([("inner", Value::record([("x", Value::number(1.0))]))]);

    let mutable = runtime.wrap(raw.clone());
    let readonly = runtime.wrap_readonly(raw);
    assert_ne!(mutable, readonly);
    assert!(is_readonly(&readonly));

    let readonly = handle_of(&readonly);
    assert_eq!(
        readonly.set("inner", Value::number(2.0)).expect("rejected write"),
        WriteOutcome::Rejected
    );

    let inner = readonly.get("inner");
    assert!(is_readonly(&inner));

    // The mutable wrapper still mutates the shared raw value, and the
    // read-only side observes it.
    let mutable = handle_of(&mutable);
    mutable.set("flag", Value::Bool(true)).expect("write");
    assert!(readonly.has("flag"));
}

/// Pausing tracking suppresses dependency recording until resumed.
#[test]
fn pause_and_resume_tracking() {
    let runtime = Runtime::new();
    let state = handle_of(&runtime.wrap(Value::record([("x", Value::number(1.0))])));

    runtime.pause_tracking();
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let paused = runtime.create_computation(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            state_clone.get("x")
        },
        ComputationOptions::default(),
    );
    runtime.resume_tracking();

    // The paused run recorded nothing.
    state.set("x", Value::number(2.0)).expect("write");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Re-running while tracking is live subscribes normally.
    paused.run();
    state.set("x", Value::number(3.0)).expect("write");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Enumeration subscribes to structure, and list appends count as adds.
#[test]
fn list_length_tracks_structural_changes() {
    let runtime = Runtime::new();
    let list = handle_of(&runtime.wrap(Value::list([Value::number(1.0)])));

    let lengths: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let lengths_clone = lengths.clone();
    let list_clone = list.clone();
    let _computation = runtime.create_computation(
        move || {
            lengths_clone.lock().unwrap().push(list_clone.len());
            Value::Null
        },
        ComputationOptions::default(),
    );

    // Value change at an existing index: length subscribers unaffected.
    list.set(0usize, Value::number(9.0)).expect("write");
    // Append one past the end: structural, re-runs the computation.
    list.set(1usize, Value::number(2.0)).expect("write");

    assert_eq!(lengths.lock().unwrap().as_slice(), &[1, 2]);
}

/// A derived value with a setter writes through to its sources.
#[test]
fn writable_derived_values_write_through() {
    let runtime = Runtime::new();
    let state = handle_of(&runtime.wrap(Value::record([("celsius", Value::number(0.0))])));

    let fahrenheit = {
        let getter_state = state.clone();
        let setter_state = state.clone();
        runtime.derive_writable(
            move || {
                let c = getter_state.get("celsius").as_number().unwrap_or(0.0);
                Value::number(c * 9.0 / 5.0 + 32.0)
            },
            move |value| {
                let f = value.as_number().unwrap_or(32.0);
                setter_state
                    .set("celsius", Value::number((f - 32.0) * 5.0 / 9.0))
                    .expect("write");
            },
        )
    };

    assert_eq!(fahrenheit.get(), Value::number(32.0));

    fahrenheit.set(Value::number(212.0)).expect("setter write");
    assert_eq!(state.get("celsius"), Value::number(100.0));
    assert_eq!(fahrenheit.get(), Value::number(212.0));
}
