use std::sync::{Arc, Mutex};

use workflow::prelude::*;

fn record(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl Fn(&Job) + Send + Sync + 'static {
	let log = log.clone();
	move |_job: &Job| {
		log.lock().unwrap().push(name);
	}
}

fn index_of(log: &[&'static str], name: &'static str) -> usize {
	log.iter().position(|&n| n == name).unwrap()
}

#[test]
fn diamond_respects_topological_order() {
	let builder = Builder::create("test");
	let log = Arc::new(Mutex::new(Vec::new()));

	let mut a = builder.node_create("A");
	a.set_function(record(&log, "A"));
	builder.node_submit(a).unwrap();

	let mut b = builder.node_create("B");
	b.set_function(record(&log, "B")).depend_on("A");
	builder.node_submit(b).unwrap();

	let mut c = builder.node_create("C");
	c.set_function(record(&log, "C")).depend_on("A");
	builder.node_submit(c).unwrap();

	let mut d = builder.node_create("D");
	d.set_function(record(&log, "D")).depend_on("B").depend_on("C");
	builder.node_submit(d).unwrap();

	let graph = builder.finalize().expect("diamond graph should compile");
	assert_eq!(graph.node_count(), 4);
	assert_eq!(graph.start_node_count(), 1);

	graph.execute();

	let log = log.lock().unwrap().clone();
	assert_eq!(log.len(), 4);
	assert!(index_of(&log, "A") < index_of(&log, "B"));
	assert!(index_of(&log, "A") < index_of(&log, "C"));
	assert!(index_of(&log, "B") < index_of(&log, "D"));
	assert!(index_of(&log, "C") < index_of(&log, "D"));
}

#[test]
fn checkpoint_is_elided_but_preserves_ordering() {
	let builder = Builder::create("test");
	let log = Arc::new(Mutex::new(Vec::new()));

	builder.add_checkpoint_edge("load", "simulate").unwrap();

	let mut l = builder.node_create("L");
	l.set_function(record(&log, "L")).make_dependency_of("load");
	builder.node_submit(l).unwrap();

	let mut s = builder.node_create("S");
	s.set_function(record(&log, "S")).depend_on("simulate");
	builder.node_submit(s).unwrap();

	let graph = builder.finalize().expect("checkpoint-bridged graph should compile");

	assert_eq!(graph.node_count(), 2);
	let names: Vec<_> = graph.node_names().collect();
	assert!(!names.iter().any(|&n| &*n == "load"));
	assert!(!names.iter().any(|&n| &*n == "simulate"));

	graph.execute();

	let log = log.lock().unwrap().clone();
	assert_eq!(log, vec!["L", "S"]);
}

#[test]
fn race_between_concurrent_writers_is_rejected() {
	let builder = Builder::create("test");

	let mut w1 = builder.node_create("W1");
	w1.set_function(|_| {}).write_resource("r");
	builder.node_submit(w1).unwrap();

	let mut w2 = builder.node_create("W2");
	w2.set_function(|_| {}).write_resource("r");
	builder.node_submit(w2).unwrap();

	assert!(builder.finalize().is_err());
}

#[test]
fn cycle_is_rejected() {
	let builder = Builder::create("test");

	let mut a = builder.node_create("A");
	a.set_function(|_| {}).depend_on("B");
	builder.node_submit(a).unwrap();

	let mut b = builder.node_create("B");
	b.set_function(|_| {}).depend_on("A");
	builder.node_submit(b).unwrap();

	assert!(builder.finalize().is_err());
}

#[test]
fn graph_is_re_runnable() {
	let builder = Builder::create("test");
	let log = Arc::new(Mutex::new(Vec::new()));

	let mut a = builder.node_create("A");
	a.set_function(record(&log, "A"));
	builder.node_submit(a).unwrap();

	let mut b = builder.node_create("B");
	b.set_function(record(&log, "B")).depend_on("A");
	builder.node_submit(b).unwrap();

	let graph = builder.finalize().unwrap();

	graph.execute();
	graph.execute();

	let log = log.lock().unwrap().clone();
	assert_eq!(log.len(), 4);
	assert_eq!(log, vec!["A", "B", "A", "B"]);
}

#[test]
fn empty_graph_is_rejected() {
	let builder = Builder::create("test");
	assert!(builder.finalize().is_err());
}

#[test]
fn duplicate_submission_is_rejected() {
	let builder = Builder::create("test");

	let mut a = builder.node_create("A");
	a.set_function(|_| {});
	builder.node_submit(a).unwrap();

	let mut a2 = builder.node_create("A");
	a2.set_function(|_| {});
	assert!(builder.node_submit(a2).is_err());
}

#[test]
fn validate_does_not_drain_the_builder() {
	let builder = Builder::create("test");

	let mut a = builder.node_create("A");
	a.set_function(|_| {});
	builder.node_submit(a).unwrap();

	assert!(builder.validate().is_ok());
	assert_eq!(builder.node_count(), 1);

	// finalize still works after validate, and now drains the builder.
	assert!(builder.finalize().is_ok());
	assert_eq!(builder.node_count(), 0);
}
