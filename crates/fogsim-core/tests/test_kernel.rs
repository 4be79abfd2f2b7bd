use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use fogsim_core::{cast, Event, EventHandler, Simulation};

#[derive(Serialize)]
struct Tick {
    seq: u32,
}

#[derive(Serialize)]
struct Unknown {}

struct Recorder {
    fired: Rc<RefCell<Vec<(f64, u32)>>>,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        let time = event.time;
        cast!(match event.data {
            Tick { seq } => {
                self.fired.borrow_mut().push((time, seq));
            }
        })
    }
}

#[test]
fn events_fire_in_time_order_with_fifo_ties() {
    let mut sim = Simulation::new(123);
    let fired = Rc::new(RefCell::new(Vec::new()));
    let recorder = Rc::new(RefCell::new(Recorder { fired: fired.clone() }));
    let id = sim.add_handler("recorder", recorder);
    let ctx = sim.create_context("driver");

    ctx.emit(Tick { seq: 0 }, id, 2.0);
    ctx.emit(Tick { seq: 1 }, id, 1.0);
    // Two events at the same time must fire in insertion order.
    ctx.emit(Tick { seq: 2 }, id, 1.0);
    ctx.emit(Tick { seq: 3 }, id, 0.5);

    sim.step_until_no_events();

    assert_eq!(
        *fired.borrow(),
        vec![(0.5, 3), (1.0, 1), (1.0, 2), (2.0, 0)]
    );
    assert_eq!(sim.time(), 2.0);
}

#[test]
fn unhandled_event_is_skipped() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut sim = Simulation::new(123);
    let fired = Rc::new(RefCell::new(Vec::new()));
    let recorder = Rc::new(RefCell::new(Recorder { fired: fired.clone() }));
    let id = sim.add_handler("recorder", recorder);
    let ctx = sim.create_context("driver");

    ctx.emit(Unknown {}, id, 1.0);
    ctx.emit(Tick { seq: 7 }, id, 2.0);

    sim.step_until_no_events();

    // The unknown payload is logged and dropped, the simulation continues.
    assert_eq!(*fired.borrow(), vec![(2.0, 7)]);
}

#[test]
fn cancel_events_by_predicate() {
    let mut sim = Simulation::new(123);
    let fired = Rc::new(RefCell::new(Vec::new()));
    let recorder = Rc::new(RefCell::new(Recorder { fired: fired.clone() }));
    let id = sim.add_handler("recorder", recorder);
    let ctx = sim.create_context("driver");

    let e0 = ctx.emit(Tick { seq: 0 }, id, 1.0);
    ctx.emit(Tick { seq: 1 }, id, 2.0);
    sim.cancel_events(|e| e.id == e0);

    sim.step_until_no_events();
    assert_eq!(*fired.borrow(), vec![(2.0, 1)]);
}

#[test]
fn reset_rewinds_clock_and_preserves_random_stream() {
    let mut sim = Simulation::new(42);
    let ctx = sim.create_context("driver");
    let id = {
        let recorder = Rc::new(RefCell::new(Recorder {
            fired: Rc::new(RefCell::new(Vec::new())),
        }));
        sim.add_handler("recorder", recorder)
    };

    ctx.emit(Tick { seq: 0 }, id, 5.0);
    sim.step();
    assert_eq!(sim.time(), 5.0);
    let _burned: f64 = sim.rand();

    ctx.emit(Tick { seq: 1 }, id, 3.0);
    sim.reset();
    assert_eq!(sim.time(), 0.0);
    assert!(sim.peek_next_event_time().is_none());

    // A fresh simulation that consumed one draw continues identically,
    // so replications chained by reset() replay the same stream.
    let mut reference = Simulation::new(42);
    let _ = reference.rand();
    assert_eq!(sim.rand(), reference.rand());
}

#[test]
fn step_for_duration_stops_at_bound() {
    let mut sim = Simulation::new(1);
    let fired = Rc::new(RefCell::new(Vec::new()));
    let recorder = Rc::new(RefCell::new(Recorder { fired: fired.clone() }));
    let id = sim.add_handler("recorder", recorder);
    let ctx = sim.create_context("driver");

    ctx.emit(Tick { seq: 0 }, id, 1.0);
    ctx.emit(Tick { seq: 1 }, id, 2.0);
    ctx.emit(Tick { seq: 2 }, id, 3.5);

    let more = sim.step_for_duration(2.5);
    assert!(more);
    assert_eq!(fired.borrow().len(), 2);
    assert_eq!(sim.time(), 2.0);

    let more = sim.step_for_duration(10.0);
    assert!(!more);
    assert_eq!(fired.borrow().len(), 3);
}
