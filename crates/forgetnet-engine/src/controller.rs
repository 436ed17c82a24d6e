//! The sequential forget-evaluate-recover loop.

use std::collections::{BTreeMap, BTreeSet};

use forgetnet_common::{types::scope_names, LayerKind, PruningRecord, Result, UnitType};
use forgetnet_importance::{ImportanceAccumulator, ImportanceCriteria, ImportanceMatrixStore};
use forgetnet_selection::{
    DeviationParams, LayerShape, PruningRateCalculator, SelectionPolicy, UnitIndexMapper,
    UnitSelector,
};
use tracing::{debug, info, warn};

use crate::model::{snapshot_get, HostModel};
use crate::snapshot::ParameterSnapshotStack;

/// Static description of one forgetting episode.
#[derive(Debug, Clone)]
pub struct EpisodeConfig {
    /// Kind of every model layer in order, output layer last.
    pub layer_kinds: Vec<LayerKind>,
    /// Number of tasks the model was trained on.
    pub n_tasks: usize,
    /// Which raw signal importance is derived from.
    pub criteria: ImportanceCriteria,
    /// Distribute pruning budgets proportionally across layers.
    pub layerwise: bool,
}

/// Orchestrates snapshot → select → zero → evaluate → record → recover
/// rounds against a host model, one policy at a time, and accumulates the
/// per-policy history behind forgetting curves.
#[derive(Debug)]
pub struct SequentialForgetController<M> {
    model: M,
    config: EpisodeConfig,
    store: ImportanceMatrixStore,
    snapshots: ParameterSnapshotStack,
    removed: BTreeMap<String, BTreeSet<usize>>,
    history: Vec<PruningRecord>,
}

impl<M: HostModel> SequentialForgetController<M> {
    pub fn new(model: M, config: EpisodeConfig) -> Self {
        Self {
            model,
            config,
            store: ImportanceMatrixStore::new(),
            snapshots: ParameterSnapshotStack::new(),
            removed: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn store(&self) -> &ImportanceMatrixStore {
        &self.store
    }

    /// Replace the importance store (e.g. one restored from disk by the
    /// caller).
    pub fn set_store(&mut self, store: ImportanceMatrixStore) {
        self.store = store;
    }

    /// Scope names of the scored layers (the output layer never scores).
    pub fn scored_scopes(&self) -> Vec<String> {
        let mut names = scope_names(&self.config.layer_kinds);
        names.pop();
        names
    }

    /// Units a layer has already had zeroed this episode.
    pub fn removed_units(&self, scope: &str) -> Vec<usize> {
        self.removed.get(scope).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Full record history in append order.
    pub fn history(&self) -> &[PruningRecord] {
        &self.history
    }

    /// Records belonging to one policy tag.
    pub fn history_for(&self, policy: &str) -> Vec<&PruningRecord> {
        self.history.iter().filter(|r| r.policy == policy).collect()
    }

    /// Policy tags in first-seen order.
    pub fn policies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for rec in &self.history {
            if !out.contains(&rec.policy.as_str()) {
                out.push(&rec.policy);
            }
        }
        out
    }

    /// Serialized history for external persistence/plotting tooling.
    pub fn history_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.history)
    }

    /// Build the full importance matrix by streaming every task's batches
    /// through the accumulator, newest task first.
    pub fn build_importance_matrix(&mut self) -> Result<()> {
        let criteria = self.config.criteria;
        let model = &mut self.model;
        self.store = ImportanceMatrixStore::build(self.config.n_tasks, |task_id| {
            let mut acc = ImportanceAccumulator::new();
            model.for_each_importance_batch(task_id, criteria, &mut |signals| {
                acc.add_batch(signals)
            })?;
            Ok(acc.finish())
        })?;
        Ok(())
    }

    /// Streaming construction: fold one task's batches into the store
    /// without a full rebuild.
    pub fn append_online_importance(&mut self, task_id: usize) -> Result<()> {
        let criteria = self.config.criteria;
        let mut acc = ImportanceAccumulator::new();
        self.model.for_each_importance_batch(task_id, criteria, &mut |signals| {
            acc.add_batch(signals)
        })?;
        self.store.append_online(task_id, acc.finish())
    }

    fn selector(&self) -> Result<UnitSelector> {
        let mapper =
            UnitIndexMapper::from_layer_kinds(&self.config.layer_kinds, &self.store.layer_widths())?;
        Ok(UnitSelector::new(mapper, self.config.layerwise))
    }

    /// Weight shapes of the scored layers read from the live model.
    pub fn rate_calculator(&self) -> Result<PruningRateCalculator> {
        let snapshot = self.model.parameters();
        let mut layers = Vec::new();
        for (scope, &kind) in self.scored_scopes().iter().zip(&self.config.layer_kinds) {
            let weight = snapshot_get(&snapshot, &format!("{scope}/weight"))?;
            layers.push(LayerShape::new(kind, weight.shape.clone()));
        }
        Ok(PruningRateCalculator::new(layers))
    }

    /// One standalone destructive pruning step: snapshot, select, zero.
    ///
    /// Returns the per-layer local indices that were zeroed. Builds the
    /// importance matrix lazily on first use.
    pub fn selective_forget(
        &mut self,
        forget_tasks: &[usize],
        count: usize,
        policy: SelectionPolicy,
        unit_type: UnitType,
        params: Option<&DeviationParams>,
    ) -> Result<Vec<Vec<usize>>> {
        self.snapshots.push(self.model.parameters());
        self.forget_without_snapshot(forget_tasks, count, policy, unit_type, params)
    }

    fn forget_without_snapshot(
        &mut self,
        forget_tasks: &[usize],
        count: usize,
        policy: SelectionPolicy,
        unit_type: UnitType,
        params: Option<&DeviationParams>,
    ) -> Result<Vec<Vec<usize>>> {
        if self.store.n_layers() == 0 {
            self.build_importance_matrix()?;
        }
        info!(
            %policy, ?forget_tasks, n_tasks = self.config.n_tasks, count, %unit_type,
            "selective forget"
        );
        let selected =
            self.selector()?.select(&self.store, policy, forget_tasks, count, unit_type, params)?;
        let scopes = self.scored_scopes();
        for (scope, locals) in scopes.iter().zip(&selected) {
            self.zero_units(scope, locals)?;
        }
        Ok(selected)
    }

    /// Zero the weight columns/filters and bias entries of the given
    /// layer-local units and mark them removed for this episode.
    fn zero_units(&mut self, scope: &str, locals: &[usize]) -> Result<()> {
        if locals.is_empty() {
            return Ok(());
        }
        debug!(scope, n = locals.len(), "zeroing units");
        let weight_name = format!("{scope}/weight");
        let bias_name = format!("{scope}/bias");
        let mut weight = self.model.parameter(&weight_name)?;
        let mut bias = self.model.parameter(&bias_name)?;
        for &unit in locals {
            weight.zero_unit(unit);
            bias.zero_unit(unit);
        }
        self.model.set_parameter(&weight_name, weight)?;
        self.model.set_parameter(&bias_name, bias)?;
        self.removed.entry(scope.to_owned()).or_default().extend(locals.iter().copied());
        Ok(())
    }

    /// Restore the most recent snapshot into the live model.
    pub fn recover_recent(&mut self) -> Result<()> {
        info!("recover recent parameters");
        let snapshot = self.snapshots.recover(-1)?.clone();
        self.model.load_parameters(&snapshot)
    }

    /// Restore the first snapshot of the episode (full un-pruning).
    pub fn recover_original(&mut self) -> Result<()> {
        info!("recover original parameters");
        let snapshot = self.snapshots.recover(0)?.clone();
        self.model.load_parameters(&snapshot)
    }

    /// Reset removed-unit bookkeeping and restore the episode origin,
    /// keeping the recorded history.
    pub fn reset_episode(&mut self) -> Result<()> {
        self.removed.clear();
        self.recover_original()
    }

    /// Run a full forgetting sweep for one policy.
    ///
    /// Step `i` of `0..=steps` prunes `i × one_step_units[unit_type]` units
    /// per declared unit type against the baseline importance matrix, then
    /// evaluates, records, and recovers (except after the final step, whose
    /// pruning is left in place). `policy_tag` names the history bucket and
    /// is parsed into the policy — numeric tags alias the deviation-mixed
    /// mean policy, and a `:suffix` distinguishes repeated runs.
    ///
    /// `fast_skip` omits the first half of the sweep except every fourth
    /// step; skipped steps leave no placeholder record.
    pub fn sequential_forget_and_predict(
        &mut self,
        forget_tasks: &[usize],
        one_step_units: &[(UnitType, usize)],
        steps: usize,
        policy_tag: &str,
        params_per_unit_type: &BTreeMap<UnitType, DeviationParams>,
        fast_skip: bool,
    ) -> Result<()> {
        let policy: SelectionPolicy = policy_tag.parse()?;
        info!(policy_tag, ?forget_tasks, n_tasks = self.config.n_tasks, "sequential forget");
        for &(unit_type, per_step) in one_step_units {
            info!(%unit_type, total = per_step * steps, "sweep budget");
        }

        let unit_types: Vec<UnitType> = one_step_units.iter().map(|&(t, _)| t).collect();
        let calculator = self.rate_calculator()?;

        for step in 0..=steps {
            if fast_skip && (step as f64) < 0.5 * (steps + 1) as f64 && step % 4 != 0 {
                warn!(step, steps, policy_tag, "fast skipped");
                continue;
            }

            self.snapshots.push(self.model.parameters());
            let mut groups = Vec::with_capacity(one_step_units.len());
            for &(unit_type, per_step) in one_step_units {
                let params = params_per_unit_type.get(&unit_type);
                let selected = self
                    .forget_without_snapshot(
                        forget_tasks,
                        step * per_step,
                        policy,
                        unit_type,
                        params,
                    )
                    .map_err(|e| e.at_step(policy_tag, step, forget_tasks))?;
                groups.push(selected);
            }

            let pruning_rate = calculator.rate(&groups, &unit_types);
            let performance = self
                .model
                .predict_all_tasks()
                .map_err(|e| e.at_step(policy_tag, step, forget_tasks))?;
            debug!(step, pruning_rate, "step evaluated");
            self.history.push(PruningRecord {
                policy: policy_tag.to_owned(),
                step,
                pruning_rate,
                performance,
            });

            if step != steps {
                self.recover_recent()?;
            }
        }
        Ok(())
    }
}
