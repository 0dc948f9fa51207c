//! Running the due processes of one round.
//!
//! Processes whose bound paths overlap must not run at the same time. The
//! conflict graph is coloured greedily; one colour class runs at a time,
//! its members in parallel when the `parallel` feature is on.

use crate::composite::ProcessInstance;
use crate::error::{Result, SimError};
use crate::process::StateView;
use crate::topology::{ProcessId, Topology};
use anyhow::anyhow;
use biosphere_data::{Directive, Path, Update};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::BTreeSet;
use tracing::trace;

/// An update computed but not yet merged, due at `completes`.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub id: ProcessId,
    pub update: Update,
    pub directives: Vec<(Path, Directive)>,
    pub completes: f64,
}

/// One invocation prepared before any process of the round runs.
pub(crate) struct Job<'a> {
    pub instance: &'a ProcessInstance,
    pub view: StateView,
    pub clock: f64,
    pub offered: f64,
}

/// Round context shared by every job.
#[derive(Clone, Copy)]
pub(crate) struct RoundContext<'a> {
    pub topology: &'a Topology,
    pub round: u64,
    pub time: f64,
    pub epsilon: f64,
}

fn shares_path(a: &[&Path], b: &[&Path]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.overlaps(y)))
}

/// Partitions jobs into classes with pairwise disjoint paths.
pub(crate) fn conflict_classes(paths: &[Vec<&Path>]) -> Vec<Vec<usize>> {
    let mut graph: UnGraph<usize, ()> = UnGraph::new_undirected();
    let nodes: Vec<NodeIndex> = (0..paths.len()).map(|i| graph.add_node(i)).collect();
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            if shares_path(&paths[i], &paths[j]) {
                graph.add_edge(nodes[i], nodes[j], ());
            }
        }
    }

    let mut colours: Vec<Option<usize>> = vec![None; paths.len()];
    let mut classes: Vec<Vec<usize>> = Vec::new();
    for node in &nodes {
        let taken: BTreeSet<usize> = graph
            .neighbors(*node)
            .filter_map(|neighbour| colours[graph[neighbour]])
            .collect();
        let colour = (0..=classes.len())
            .find(|c| !taken.contains(c))
            .unwrap_or(classes.len());
        let index = graph[*node];
        colours[index] = Some(colour);
        if colour == classes.len() {
            classes.push(Vec::new());
        }
        classes[colour].push(index);
    }
    classes
}

/// Calls one process and checks what it returns.
pub(crate) fn invoke(job: &Job<'_>, ctx: RoundContext<'_>) -> Result<Pending> {
    let instance = job.instance;
    let fail = |source: anyhow::Error| SimError::process(&instance.id, ctx.round, ctx.time, source);

    let step = instance
        .process
        .next_update(job.offered, &job.view)
        .map_err(fail)?;
    let consumed = step.consumed;
    if !(consumed.is_finite() && consumed > 0.0 && consumed <= job.offered + ctx.epsilon) {
        return Err(fail(anyhow!(
            "consumed {consumed} outside (0, {}]",
            job.offered
        )));
    }
    let (update, directives) = ctx
        .topology
        .absolute_update(&instance.id, &instance.ports, &step.update)?;
    Ok(Pending {
        id: instance.id.clone(),
        update,
        directives,
        completes: job.clock + consumed.min(job.offered),
    })
}

#[cfg(feature = "parallel")]
fn run_class(class: &[usize], jobs: &[Job<'_>], ctx: RoundContext<'_>, parallel: bool) -> Vec<Result<Pending>> {
    use rayon::prelude::*;
    if parallel && class.len() > 1 {
        class.par_iter().map(|&i| invoke(&jobs[i], ctx)).collect()
    } else {
        class.iter().map(|&i| invoke(&jobs[i], ctx)).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn run_class(class: &[usize], jobs: &[Job<'_>], ctx: RoundContext<'_>, _parallel: bool) -> Vec<Result<Pending>> {
    class.iter().map(|&i| invoke(&jobs[i], ctx)).collect()
}

/// Runs every job, one conflict class at a time. Results come back in job
/// order; the first failure in that order is returned.
pub(crate) fn run_jobs(jobs: &[Job<'_>], ctx: RoundContext<'_>, parallel: bool) -> Result<Vec<Pending>> {
    let paths: Vec<Vec<&Path>> = jobs
        .iter()
        .map(|job| ctx.topology.paths_of(&job.instance.id))
        .collect();
    let classes = conflict_classes(&paths);
    trace!(jobs = jobs.len(), classes = classes.len(), "running round");

    let mut results: Vec<Option<Result<Pending>>> = (0..jobs.len()).map(|_| None).collect();
    for class in &classes {
        for (index, outcome) in class.iter().zip(run_class(class, jobs, ctx, parallel)) {
            results[*index] = Some(outcome);
        }
    }
    results.into_iter().flatten().collect()
}
