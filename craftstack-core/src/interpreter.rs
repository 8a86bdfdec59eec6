//! Interpreter - Execute a stack using a Provider
//!
//! The Interpreter walks the stack's dependency graph, resolves references as
//! their targets materialize, and turns each declaration into an Effect. This
//! is where side effects actually occur.
//!
//! Lookups whose inputs are lookups themselves run before anything else, so a
//! failed lookup (e.g., no default VPC) stops the run before any resource is
//! created. Every failure stops the run; nothing is retried or rolled back.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::differ::{Diff, diff};
use crate::effect::Effect;
use crate::error::ApplyError;
use crate::graph::collect_references;
use crate::plan::Plan;
use crate::provider::Provider;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::stack::{DERIVED_VALUE, Declaration, DerivedValue, Stack};

/// Binding name -> attributes known for it so far
pub type Bindings = HashMap<String, HashMap<String, Value>>;

/// Result of materializing each declaration
#[derive(Debug)]
pub enum EffectOutcome {
    /// Data source lookup succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Resource already matches its declaration
    Unchanged { state: State },
    /// Delete succeeded
    Deleted,
    /// Derived value computed
    Derived,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    fn is_mutation(&self) -> bool {
        matches!(
            self,
            EffectOutcome::Created { .. } | EffectOutcome::Updated { .. } | EffectOutcome::Deleted
        )
    }
}

/// Result of an apply or destroy run
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Binding name and outcome, in execution order
    pub outcomes: Vec<(String, EffectOutcome)>,
    /// Everything resolved during the run, including derived values
    pub bindings: Bindings,
    /// The error that stopped the run, if any
    pub failure: Option<ApplyError>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of create, update and delete calls that succeeded
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_mutation()).count()
    }

    /// Resolved attribute of a binding
    pub fn output(&self, binding: &str, attribute: &str) -> Option<&Value> {
        self.bindings.get(binding).and_then(|a| a.get(attribute))
    }
}

/// Result of planning a stack without side effects
#[derive(Debug, Default)]
pub struct Preview {
    pub plan: Plan,
    pub bindings: Bindings,
}

impl Preview {
    /// Resolved attribute of a binding
    pub fn output(&self, binding: &str, attribute: &str) -> Option<&Value> {
        self.bindings.get(binding).and_then(|a| a.get(attribute))
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    ReadOnly,
    Mutate,
}

#[derive(Default)]
struct Run {
    plan: Plan,
    outcomes: Vec<(String, EffectOutcome)>,
    bindings: Bindings,
    /// Managed resources (resolved) with the state read for them, in order
    current: Vec<(Resource, State)>,
}

impl Run {
    fn finish(self, failure: Option<ApplyError>) -> ApplyResult {
        ApplyResult {
            outcomes: self.outcomes,
            bindings: self.bindings,
            failure,
        }
    }
}

/// Interpreter that executes a Stack using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Read everything and compute the Effects an apply would run
    pub async fn plan(&self, stack: &Stack) -> Result<Preview, ApplyError> {
        let mut run = Run::default();
        self.reconcile(stack, Mode::ReadOnly, &mut run).await?;
        Ok(Preview {
            plan: run.plan,
            bindings: run.bindings,
        })
    }

    /// Bring infrastructure to the declared state
    pub async fn apply(&self, stack: &Stack) -> ApplyResult {
        let mode = if self.config.dry_run {
            Mode::ReadOnly
        } else {
            Mode::Mutate
        };
        let mut run = Run::default();
        match self.reconcile(stack, mode, &mut run).await {
            Ok(()) => run.finish(None),
            Err(e) => run.finish(Some(e)),
        }
    }

    /// Compute the Delete effects a destroy would run
    pub async fn plan_destroy(&self, stack: &Stack) -> Result<Plan, ApplyError> {
        let (_, targets) = self.destroy_targets(stack).await?;
        let mut plan = Plan::new();
        for (resource, identifier) in targets {
            plan.add(Effect::Delete {
                resource,
                identifier,
            });
        }
        Ok(plan)
    }

    /// Delete every managed resource that exists, dependents first
    pub async fn destroy(&self, stack: &Stack) -> ApplyResult {
        let (mut run, targets) = match self.destroy_targets(stack).await {
            Ok(found) => found,
            Err(e) => return Run::default().finish(Some(e)),
        };

        for (resource, identifier) in targets {
            let binding = resource.binding().to_string();
            if self.config.dry_run {
                run.outcomes.push((
                    binding,
                    EffectOutcome::Skipped {
                        reason: "dry-run mode".to_string(),
                    },
                ));
                continue;
            }

            info!("Deleting {} ({})", resource.id, identifier);
            if let Err(e) = self.provider.delete(&resource, &identifier).await {
                return run.finish(Some(e.into()));
            }
            run.outcomes.push((binding, EffectOutcome::Deleted));
        }

        run.finish(None)
    }

    async fn destroy_targets(
        &self,
        stack: &Stack,
    ) -> Result<(Run, Vec<(Resource, String)>), ApplyError> {
        let mut run = Run::default();
        self.reconcile(stack, Mode::ReadOnly, &mut run).await?;

        let targets = run
            .current
            .drain(..)
            .rev()
            .filter(|(_, state)| state.exists)
            .map(|(resource, state)| {
                let identifier = state
                    .identifier
                    .unwrap_or_else(|| resource.id.name.clone());
                (resource, identifier)
            })
            .collect();

        run.plan = Plan::new();
        run.outcomes.clear();
        Ok((run, targets))
    }

    async fn reconcile(&self, stack: &Stack, mode: Mode, run: &mut Run) -> Result<(), ApplyError> {
        let graph = stack.graph()?;
        let order = graph.topological_order()?;

        let is_data_source =
            |binding: &str| stack.find_resource(binding).is_some_and(Resource::is_data_source);

        // Lookups that only depend on other lookups go first
        let mut done: HashSet<&str> = HashSet::new();
        for binding in &order {
            if let Some(resource) = stack.find_resource(binding)
                && resource.is_data_source()
                && graph
                    .transitive_dependencies(binding)
                    .iter()
                    .all(|d| is_data_source(d))
            {
                self.lookup(resource, run).await?;
                done.insert(binding.as_str());
            }
        }

        for binding in &order {
            if done.contains(binding.as_str()) {
                continue;
            }
            match stack.find(binding) {
                Some(Declaration::Resource(resource)) if resource.is_data_source() => {
                    self.lookup(resource, run).await?
                }
                Some(Declaration::Resource(resource)) => {
                    self.reconcile_resource(resource, mode, run).await?
                }
                Some(Declaration::Derived(derived)) => self.derive(derived, mode, run)?,
                None => {}
            }
        }

        Ok(())
    }

    async fn lookup(&self, resource: &Resource, run: &mut Run) -> Result<(), ApplyError> {
        let resolved = resolve_resource(resource, &run.bindings);
        ensure_resolved(&resolved)?;

        debug!("Reading {}", resolved.id);
        let state = self.provider.read(&resolved, None).await?;
        if !state.exists {
            return Err(ApplyError::LookupNotFound(resolved.id));
        }

        record_binding(&mut run.bindings, &resolved, &state);
        run.outcomes
            .push((resolved.binding().to_string(), EffectOutcome::Read { state }));
        run.plan.add(Effect::Read(resolved));
        Ok(())
    }

    async fn reconcile_resource(
        &self,
        resource: &Resource,
        mode: Mode,
        run: &mut Run,
    ) -> Result<(), ApplyError> {
        let resolved = resolve_resource(resource, &run.bindings);
        let binding = resolved.binding().to_string();

        debug!("Reading {}", resolved.id);
        let current = self.provider.read(&resolved, None).await?;

        let outcome = match (diff(&resolved, &current), mode) {
            (Diff::NoChange(_), _) => {
                record_binding(&mut run.bindings, &resolved, &current);
                EffectOutcome::Unchanged {
                    state: current.clone(),
                }
            }
            (Diff::Create(desired), Mode::ReadOnly) => {
                record_binding(&mut run.bindings, &resolved, &current);
                run.plan.add(Effect::Create(desired));
                skipped()
            }
            (Diff::Create(desired), Mode::Mutate) => {
                ensure_resolved(&desired)?;
                info!("Creating {}", desired.id);
                let state = self.provider.create(&desired).await?;
                record_binding(&mut run.bindings, &desired, &state);
                run.plan.add(Effect::Create(desired));
                EffectOutcome::Created { state }
            }
            (Diff::Update { id, from, to, .. }, Mode::ReadOnly) => {
                record_binding(&mut run.bindings, &resolved, &current);
                run.plan.add(Effect::Update { id, from, to });
                skipped()
            }
            (
                Diff::Update {
                    id,
                    from,
                    to,
                    changed_attributes,
                },
                Mode::Mutate,
            ) => {
                ensure_resolved(&to)?;
                info!("Updating {} ({})", id, changed_attributes.join(", "));
                let identifier = from.identifier.clone().unwrap_or_else(|| id.name.clone());
                let state = self.provider.update(&id, &identifier, &from, &to).await?;
                record_binding(&mut run.bindings, &to, &state);
                run.plan.add(Effect::Update { id, from, to });
                EffectOutcome::Updated { state }
            }
        };

        run.outcomes.push((binding, outcome));
        run.current.push((resolved, current));
        Ok(())
    }

    fn derive(&self, derived: &DerivedValue, mode: Mode, run: &mut Run) -> Result<(), ApplyError> {
        let inputs: Vec<Value> = derived
            .inputs
            .iter()
            .map(|v| resolve_value(v, &run.bindings))
            .collect();

        if let Some(unresolved) = inputs.iter().find(|v| !v.is_resolved()) {
            if mode == Mode::ReadOnly {
                debug!("Derived value {} is not known yet", derived.name);
                return Ok(());
            }
            let mut refs = Vec::new();
            collect_references(unresolved, &mut refs);
            if let Some((binding, attribute)) = refs.into_iter().next() {
                return Err(ApplyError::UnresolvedReference {
                    id: ResourceId::new("derived", derived.name.clone()),
                    binding,
                    attribute,
                });
            }
        }

        let value = derived.evaluate(&inputs)?;
        run.bindings.insert(
            derived.name.clone(),
            HashMap::from([(DERIVED_VALUE.to_string(), value)]),
        );
        run.outcomes
            .push((derived.name.clone(), EffectOutcome::Derived));
        Ok(())
    }
}

fn skipped() -> EffectOutcome {
    EffectOutcome::Skipped {
        reason: "dry-run mode".to_string(),
    }
}

/// Record what is known about a binding: the provider's state, overlaid with
/// the resolved desired attributes.
fn record_binding(bindings: &mut Bindings, resource: &Resource, state: &State) {
    let mut attrs = state.attributes.clone();
    if let Some(identifier) = &state.identifier {
        attrs
            .entry("id".to_string())
            .or_insert_with(|| Value::String(identifier.clone()));
    }
    for (k, v) in &resource.attributes {
        if v.is_resolved() {
            attrs.insert(k.clone(), v.clone());
        }
    }
    bindings.insert(resource.binding().to_string(), attrs);
}

fn ensure_resolved(resource: &Resource) -> Result<(), ApplyError> {
    let mut keys: Vec<&String> = resource.attributes.keys().collect();
    keys.sort();
    for key in keys {
        let mut refs = Vec::new();
        collect_references(&resource.attributes[key], &mut refs);
        if let Some((binding, attribute)) = refs.into_iter().next() {
            return Err(ApplyError::UnresolvedReference {
                id: resource.id.clone(),
                binding,
                attribute,
            });
        }
    }
    Ok(())
}

/// Replace every reference whose target is known with its value
pub fn resolve_value(value: &Value, bindings: &Bindings) -> Value {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            if let Some(attrs) = bindings.get(binding_name)
                && let Some(attr_value) = attrs.get(attr_name)
            {
                // Recursively resolve
                return resolve_value(attr_value, bindings);
            }
            // Keep as-is if not found
            value.clone()
        }
        Value::List(items) => Value::List(items.iter().map(|v| resolve_value(v, bindings)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, bindings)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Copy of `resource` with references resolved where possible
pub fn resolve_resource(resource: &Resource, bindings: &Bindings) -> Resource {
    let mut resolved = resource.clone();
    for (key, value) in &resource.attributes {
        resolved
            .attributes
            .insert(key.clone(), resolve_value(value, bindings));
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, ProviderError, ProviderResult, ResourceType};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory provider: data sources come from `lookups`, managed
    /// resources live in `existing` keyed by name.
    #[derive(Default)]
    struct TestProvider {
        lookups: HashMap<String, HashMap<String, Value>>,
        existing: Mutex<HashMap<String, State>>,
        calls: Mutex<Vec<String>>,
    }

    impl TestProvider {
        fn with_lookup(mut self, name: &str, attrs: Vec<(&str, Value)>) -> Self {
            self.lookups.insert(
                name.to_string(),
                attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            resource: &Resource,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = if resource.read_only {
                match self.lookups.get(resource.binding()) {
                    Some(attrs) => State::existing(resource.id.clone(), attrs.clone()),
                    None => State::not_found(resource.id.clone()),
                }
            } else {
                self.existing
                    .lock()
                    .unwrap()
                    .get(resource.binding())
                    .cloned()
                    .unwrap_or_else(|| State::not_found(resource.id.clone()))
            };
            Box::pin(async move { Ok(state) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", resource.binding()));
            let mut attrs = resource.attributes.clone();
            attrs.insert(
                "arn".to_string(),
                Value::String(format!("arn:test:{}", resource.binding())),
            );
            let state = State::existing(resource.id.clone(), attrs)
                .with_identifier(format!("{}-id", resource.binding()));
            self.existing
                .lock()
                .unwrap()
                .insert(resource.binding().to_string(), state.clone());
            Box::pin(async move { Ok(state) })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update {}", id.name));
            let state =
                State::existing(id.clone(), to.attributes.clone()).with_identifier(identifier);
            Box::pin(async move { Ok(state) })
        }

        fn delete(
            &self,
            resource: &Resource,
            identifier: &str,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {} {}", resource.binding(), identifier));
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingProvider;

    impl Provider for FailingProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            resource: &Resource,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let err = ProviderError::new("access denied").for_resource(resource.id.clone());
            Box::pin(async move { Err(err) })
        }

        fn update(
            &self,
            _id: &ResourceId,
            _identifier: &str,
            _from: &State,
            _to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            Box::pin(async { Err(ProviderError::new("unsupported")) })
        }

        fn delete(
            &self,
            _resource: &Resource,
            _identifier: &str,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn stack(counter: Arc<AtomicUsize>) -> Stack {
        let mut stack = Stack::new("test");
        let network = stack.data(Resource::new("test.network", "network"));
        let role = stack.resource(Resource::new("test.role", "role").with_attribute("name", "role"));
        let cluster = stack.resource(
            Resource::new("test.cluster", "cluster")
                .with_attribute("name", "cluster")
                .with_attribute("network_id", network.output("id"))
                .with_attribute("role_arn", role.output("arn")),
        );
        let summary = stack
            .all([cluster.output("name"), cluster.output("arn")])
            .apply("summary", move |inputs| {
                counter.fetch_add(1, Ordering::SeqCst);
                let name = inputs[0].as_str().ok_or("name is not a string")?;
                let arn = inputs[1].as_str().ok_or("arn is not a string")?;
                Ok(Value::String(format!("{}={}", name, arn)))
            });
        stack.resource(
            Resource::new("test.client", "client")
                .with_attribute("config", summary.value())
                .with_depends_on("cluster"),
        );
        stack
    }

    fn provider() -> TestProvider {
        TestProvider::default().with_lookup("network", vec![("id", Value::string("net-1"))])
    }

    #[tokio::test]
    async fn apply_creates_in_dependency_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let interpreter = Interpreter::new(provider());
        let result = interpreter.apply(&stack(counter.clone())).await;

        assert!(result.is_success(), "{:?}", result.failure);
        assert_eq!(result.success_count(), 3);
        assert_eq!(
            interpreter.provider().calls(),
            vec!["create role", "create cluster", "create client"]
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.output("client", "config"),
            Some(&Value::string("cluster=arn:test:cluster"))
        );
        assert_eq!(
            result.output("cluster", "role_arn"),
            Some(&Value::string("arn:test:role"))
        );
    }

    #[tokio::test]
    async fn second_apply_changes_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let interpreter = Interpreter::new(provider());
        let first = interpreter.apply(&stack(counter.clone())).await;
        assert!(first.is_success());

        let second = interpreter.apply(&stack(counter.clone())).await;
        assert!(second.is_success());
        assert_eq!(second.success_count(), 0);
        assert_eq!(interpreter.provider().calls().len(), 3);

        let preview = interpreter.plan(&stack(counter)).await.unwrap();
        assert!(preview.plan.is_empty());
    }

    #[tokio::test]
    async fn plan_does_not_mutate() {
        let counter = Arc::new(AtomicUsize::new(0));
        let interpreter = Interpreter::new(provider());
        let preview = interpreter.plan(&stack(counter.clone())).await.unwrap();

        let summary = preview.plan.summary();
        assert_eq!(summary.read, 1);
        assert_eq!(summary.create, 3);
        assert!(interpreter.provider().calls().is_empty());
        // The derived value waits for the cluster's arn, which is not known yet
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(
            preview.output("cluster", "network_id"),
            Some(&Value::string("net-1"))
        );
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig { dry_run: true };
        let interpreter = Interpreter::new(provider()).with_config(config);
        let result = interpreter
            .apply(&stack(Arc::new(AtomicUsize::new(0))))
            .await;

        assert!(result.is_success());
        assert!(interpreter.provider().calls().is_empty());
        assert!(
            result
                .outcomes
                .iter()
                .any(|(_, o)| matches!(o, EffectOutcome::Skipped { .. }))
        );
    }

    #[tokio::test]
    async fn missing_lookup_fails_before_any_create() {
        let interpreter = Interpreter::new(TestProvider::default());
        let result = interpreter
            .apply(&stack(Arc::new(AtomicUsize::new(0))))
            .await;

        assert!(matches!(
            result.failure,
            Some(ApplyError::LookupNotFound(ref id)) if id.name == "network"
        ));
        assert!(interpreter.provider().calls().is_empty());
        assert!(result.outcomes.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_stops_the_run() {
        let mut stack = Stack::new("failing");
        stack.resource(Resource::new("test.role", "first"));
        stack.resource(Resource::new("test.role", "second"));

        let result = Interpreter::new(FailingProvider).apply(&stack).await;
        match result.failure {
            Some(ApplyError::Provider(e)) => {
                assert_eq!(e.resource_id, Some(ResourceId::new("test.role", "first")));
            }
            other => panic!("Expected provider error, got {:?}", other),
        }
        assert!(result.outcomes.is_empty());
    }

    #[tokio::test]
    async fn coercion_failure_is_reported() {
        let mut stack = Stack::new("coercion");
        let role = stack.resource(Resource::new("test.role", "role"));
        stack
            .all([role.output("arn")])
            .apply("count", |inputs| {
                inputs[0]
                    .as_int()
                    .map(Value::Int)
                    .ok_or_else(|| "arn is not an integer".to_string())
            });

        let result = Interpreter::new(provider()).apply(&stack).await;
        match result.failure {
            Some(ApplyError::Coercion { binding, message }) => {
                assert_eq!(binding, "count");
                assert_eq!(message, "arn is not an integer");
            }
            other => panic!("Expected coercion error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn destroy_deletes_dependents_first() {
        let counter = Arc::new(AtomicUsize::new(0));
        let interpreter = Interpreter::new(provider());
        assert!(interpreter.apply(&stack(counter.clone())).await.is_success());

        let plan = interpreter.plan_destroy(&stack(counter.clone())).await.unwrap();
        assert_eq!(plan.summary().delete, 3);

        let result = interpreter.destroy(&stack(counter)).await;
        assert!(result.is_success());
        let deletes: Vec<String> = interpreter
            .provider()
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                "delete client client-id",
                "delete cluster cluster-id",
                "delete role role-id"
            ]
        );
    }

    #[test]
    fn resolve_value_follows_nested_references() {
        let mut bindings = Bindings::new();
        bindings.insert(
            "subnets".to_string(),
            HashMap::from([("ids".to_string(), Value::string_list(["s1", "s2"]))]),
        );
        let value = Value::map([(
            "subnet_ids",
            Value::ResourceRef("subnets".to_string(), "ids".to_string()),
        )]);
        let resolved = resolve_value(&value, &bindings);
        assert_eq!(
            resolved.get("subnet_ids"),
            Some(&Value::string_list(["s1", "s2"]))
        );

        let missing = Value::ResourceRef("cluster".to_string(), "endpoint".to_string());
        assert_eq!(resolve_value(&missing, &bindings), missing);
    }
}
