// tests/properties.rs

mod common;
use crate::common::{DefinitionBuilder, Harness, RunBuilder};

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use pipeline_operator::api::{Kind, PipelineDefinition, RunOutcome};
use pipeline_operator::exec::WorkloadPhase;

/// Random acyclic pipeline: step `i` may only consume outputs of steps
/// `0..i`. Returns the definition and each step's upstream set.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = (PipelineDefinition, Vec<BTreeSet<usize>>)> {
    (1..=max_steps).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n).prop_map(
            move |raw| {
                let upstream: Vec<BTreeSet<usize>> = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect();

                let ids: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
                let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                let mut builder = DefinitionBuilder::new("prop", "1.0.0").steps(&id_refs);
                for (i, deps) in upstream.iter().enumerate() {
                    for d in deps {
                        builder = builder.pipe(&format!("s{d}:out.txt"), &format!("s{i}:in{d}.txt"));
                    }
                }
                (builder.build(), upstream)
            },
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn runs_respect_dependencies_and_terminate(
        (definition, upstream) in dag_strategy(7),
        failing in proptest::collection::hash_set(0..7usize, 0..3),
    ) {
        let h = Harness::new();
        h.add_definition(&definition);
        h.create(&RunBuilder::new("r1", "prop").build());
        h.settle().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut succeeded: HashSet<usize> = HashSet::new();
        let mut ran: Vec<usize> = Vec::new();
        let mut recorded: Option<RunOutcome> = None;

        for _ in 0..64 {
            let running = h.executor.running();
            if running.is_empty() {
                break;
            }
            for workload in running {
                let idx: usize = workload
                    .strip_prefix("r1-s")
                    .and_then(|i| i.parse().ok())
                    .ok_or_else(|| TestCaseError::fail(format!("unexpected workload {workload}")))?;

                // Startability: nothing runs before all of its inputs succeeded.
                for dep in &upstream[idx] {
                    prop_assert!(succeeded.contains(dep), "s{idx} started before s{dep} succeeded");
                }
                ran.push(idx);

                let phase = if failing.contains(&idx) {
                    WorkloadPhase::Failed
                } else {
                    succeeded.insert(idx);
                    WorkloadPhase::Succeeded
                };
                h.complete("r1", &format!("s{idx}"), phase);

                // Once recorded, the outcome never changes.
                let now = h.run("r1").status.outcome;
                if let Some(previous) = recorded {
                    prop_assert_eq!(now, Some(previous));
                }
                recorded = now;

                // Settled: a volume is only kept while its step or one of
                // its consumers has not succeeded.
                let run = h.run("r1");
                for step in 0..upstream.len() {
                    let id = format!("s{step}");
                    if !run.has_volume(&id) {
                        continue;
                    }
                    let consumers_done = (0..upstream.len())
                        .filter(|c| upstream[*c].contains(&step))
                        .all(|c| run.has_succeeded(&format!("s{c}")));
                    prop_assert!(
                        !(run.has_succeeded(&id) && consumers_done),
                        "volume of {id} outlived its consumers"
                    );
                }
            }
        }

        prop_assert!(h.executor.running().is_empty());
        let distinct: HashSet<usize> = ran.iter().copied().collect();
        prop_assert_eq!(distinct.len(), ran.len(), "a step was started twice");

        let run = h.run("r1");
        let any_failed = ran.iter().any(|i| failing.contains(i));
        if any_failed {
            prop_assert_eq!(run.status.outcome, Some(RunOutcome::Failed));
        } else {
            prop_assert_eq!(run.status.outcome, Some(RunOutcome::Succeeded));
            prop_assert_eq!(ran.len(), upstream.len());
            prop_assert_eq!(h.store.count(Kind::VolumeClaim), 0, "volumes orphaned after success");
        }
        prop_assert_eq!(run.status.steps_active, 0);

        // A failure elsewhere never strands a step whose inputs all succeeded.
        for (idx, deps) in upstream.iter().enumerate() {
            if !distinct.contains(&idx) {
                prop_assert!(
                    deps.iter().any(|d| !succeeded.contains(d)),
                    "s{idx} had all inputs but never ran"
                );
            }
        }
    }
}
