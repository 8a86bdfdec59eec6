mod stack;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::info;

use craftstack_core::effect::Effect;
use craftstack_core::interpreter::{ApplyResult, EffectOutcome, Interpreter, InterpreterConfig};
use craftstack_core::plan::Plan;
use craftstack_core::provider::ProviderSet;
use craftstack_core::resource::Value;
use craftstack_core::schema::ResourceSchema;
use craftstack_core::stack::{DERIVED_VALUE, Stack};
use craftstack_provider_aws::AwsProvider;
use craftstack_provider_kubernetes::KubernetesProvider;

use crate::stack::{StackConfig, minecraft_stack, ordering_warnings};

#[derive(Parser)]
#[command(name = "craftstack")]
#[command(about = "Provision an EKS cluster and run a Minecraft server on it", long_about = None)]
struct Cli {
    /// AWS region (defaults to the SDK's environment and profile chain)
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack declaration without contacting any service
    Validate,
    /// Show execution plan without applying changes
    Plan,
    /// Apply changes to reach the desired state
    Apply {
        /// Read and plan only; skip every create and update
        #[arg(long)]
        dry_run: bool,
    },
    /// Destroy all resources of the stack
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print the kubeconfig of the deployed cluster
    Kubeconfig,
    /// Show the dependency graph
    Graph,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let stack = minecraft_stack(&StackConfig::default());
    let region = cli.region.as_deref();

    let result = match cli.command {
        Commands::Validate => run_validate(&stack),
        Commands::Plan => run_plan(&stack, region).await,
        Commands::Apply { dry_run } => run_apply(&stack, region, dry_run).await,
        Commands::Destroy { auto_approve } => run_destroy(&stack, region, auto_approve).await,
        Commands::Kubeconfig => run_kubeconfig(&stack, region).await,
        Commands::Graph => run_graph(&stack),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> Vec<ResourceSchema> {
    let mut schemas = craftstack_provider_aws::schemas::all_schemas();
    schemas.extend(craftstack_provider_kubernetes::schemas::schemas());
    schemas
}

async fn get_providers(region: Option<&str>) -> ProviderSet {
    info!("Loading providers (region: {})", region.unwrap_or("SDK default"));
    ProviderSet::new()
        .with(AwsProvider::new(region).await)
        .with(KubernetesProvider::new())
}

fn validate_stack(stack: &Stack) -> Result<(), String> {
    stack.validate(&get_schemas()).map_err(|e| e.to_string())?;
    // Also catches cycles and references to undeclared bindings
    stack
        .graph()
        .and_then(|g| g.topological_order())
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn print_warnings(stack: &Stack) -> Result<(), String> {
    let warnings = ordering_warnings(stack).map_err(|e| e.to_string())?;
    for warning in warnings {
        println!("{} {}", "Warning:".yellow().bold(), warning);
    }
    Ok(())
}

fn run_validate(stack: &Stack) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    validate_stack(stack)?;
    print_warnings(stack)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            stack.resources().count()
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_plan(stack: &Stack, region: Option<&str>) -> Result<(), String> {
    validate_stack(stack)?;

    let interpreter = Interpreter::new(get_providers(region).await);
    info!("Planning stack {}", stack.name());
    let preview = interpreter
        .plan(stack)
        .await
        .map_err(|e| format!("Failed to plan: {}", e))?;
    info!("{}", preview.plan.summary());

    print_plan(&preview.plan);
    Ok(())
}

async fn run_apply(stack: &Stack, region: Option<&str>, dry_run: bool) -> Result<(), String> {
    validate_stack(stack)?;

    let interpreter = Interpreter::new(get_providers(region).await)
        .with_config(InterpreterConfig { dry_run });
    let preview = interpreter
        .plan(stack)
        .await
        .map_err(|e| format!("Failed to plan: {}", e))?;

    if preview.plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&preview.plan);
    println!();

    if dry_run {
        println!("{}", "Dry run: no changes will be made.".yellow().bold());
    } else {
        println!("{}", "Applying changes...".cyan().bold());
    }
    println!();

    info!("Applying stack {} (dry run: {})", stack.name(), dry_run);
    let result = interpreter.apply(stack).await;
    info!("Apply finished: {} changes", result.success_count());
    print_outcomes(&result);
    println!();

    if let Some(failure) = result.failure {
        return Err(format!(
            "Apply failed after {} changes: {}",
            result.success_count(),
            failure
        ));
    }

    if dry_run {
        println!("{}", "Dry run complete.".green().bold());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Apply complete! {} changes applied.",
            result.success_count()
        )
        .green()
        .bold()
    );

    if let Some(endpoint) = result.output("eks-cluster", "endpoint").and_then(Value::as_str) {
        println!();
        println!("  {}: {}", "Cluster endpoint".bold(), endpoint);
        println!(
            "  Run {} to connect with kubectl.",
            "craftstack kubeconfig > kubeconfig.yaml".cyan()
        );
    }

    Ok(())
}

async fn run_destroy(stack: &Stack, region: Option<&str>, auto_approve: bool) -> Result<(), String> {
    let interpreter = Interpreter::new(get_providers(region).await);
    let plan = interpreter
        .plan_destroy(stack)
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    // Display destroy plan
    println!("{}", "Destroy Plan:".red().bold());
    println!();

    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }

    println!();
    println!(
        "Plan: {} to destroy.",
        plan.summary().delete.to_string().red()
    );
    println!();

    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?"
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    info!("Destroying stack {}", stack.name());
    let result = interpreter.destroy(stack).await;
    info!("Destroy finished: {} deletions", result.success_count());
    print_outcomes(&result);
    println!();

    match result.failure {
        None => {
            println!(
                "{}",
                format!(
                    "Destroy complete! {} resources destroyed.",
                    result.success_count()
                )
                .green()
                .bold()
            );
            Ok(())
        }
        Some(failure) => Err(format!(
            "Destroy failed after {} deletions: {}",
            result.success_count(),
            failure
        )),
    }
}

async fn run_kubeconfig(stack: &Stack, region: Option<&str>) -> Result<(), String> {
    let interpreter = Interpreter::new(get_providers(region).await);
    let preview = interpreter
        .plan(stack)
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;

    match preview.output("kubeconfig", DERIVED_VALUE) {
        Some(Value::String(kubeconfig)) => {
            print!("{}", kubeconfig);
            Ok(())
        }
        _ => Err("The cluster is not deployed yet. Run `craftstack apply` first.".to_string()),
    }
}

fn run_graph(stack: &Stack) -> Result<(), String> {
    let graph = stack.graph().map_err(|e| e.to_string())?;
    let layers = graph.layers().map_err(|e| e.to_string())?;

    println!("{}", "Dependency Graph:".cyan().bold());
    println!();

    for (i, layer) in layers.iter().enumerate() {
        println!("{}", format!("Layer {}", i).bold());
        for binding in layer {
            println!("  {}", binding.cyan());
            for dependency in graph.dependencies_of(binding) {
                if dependency.is_explicit() {
                    println!(
                        "    {} {} {}",
                        "<-".dimmed(),
                        dependency.target,
                        "(depends_on)".yellow()
                    );
                } else {
                    println!(
                        "    {} {}.{} {}",
                        "<-".dimmed(),
                        dependency.target,
                        dependency.attribute,
                        format!("(used in {})", dependency.used_in).dimmed()
                    );
                }
            }
        }
    }
    println!();

    print_warnings(stack)
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Read(r) => {
                println!("  {} {}", "<=".normal(), r.id.to_string().dimmed());
            }
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                let mut keys: Vec<&String> = r.attributes.keys().collect();
                keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
                    ("name", _) => std::cmp::Ordering::Less,
                    (_, "name") => std::cmp::Ordering::Greater,
                    _ => a.cmp(b),
                });
                for key in keys {
                    let value = format_value(&r.attributes[key]);
                    if key == "name" {
                        println!("      {}: {}", key.bold(), value.white().bold());
                    } else {
                        println!("      {}: {}", key, value.green());
                    }
                }
            }
            Effect::Update { id, from, to } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                let mut keys: Vec<&String> = to
                    .attributes
                    .iter()
                    .filter(|(k, v)| from.attributes.get(*k) != Some(*v))
                    .map(|(k, _)| k)
                    .collect();
                keys.sort();
                for key in keys {
                    let old = from
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!(
                        "      {}: {} → {}",
                        key,
                        old.red(),
                        format_value(&to.attributes[key]).green()
                    );
                }
            }
            Effect::Delete { resource, .. } => {
                println!("  {} {}", "-".red().bold(), resource.id.to_string().cyan().bold());
            }
        }
    }

    println!();
    println!("{}", plan.summary());
}

fn print_outcomes(result: &ApplyResult) {
    for (binding, outcome) in &result.outcomes {
        match outcome {
            EffectOutcome::Created { state } => {
                println!("  {} Create {}", "✓".green(), state.id);
            }
            EffectOutcome::Updated { state } => {
                println!("  {} Update {}", "✓".green(), state.id);
            }
            EffectOutcome::Deleted => {
                println!("  {} Delete {}", "✓".green(), binding);
            }
            EffectOutcome::Skipped { reason } => {
                println!("  {} {} ({})", "○".yellow(), binding, reason.dimmed());
            }
            EffectOutcome::Read { .. } | EffectOutcome::Unchanged { .. } | EffectOutcome::Derived => {}
        }
    }

    if let Some(failure) = &result.failure {
        println!("  {} {}", "✗".red(), failure);
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains('\n') => {
            // Policy documents print compactly, other documents by size
            match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json) => json.to_string(),
                Err(_) => format!("<{} lines>", s.lines().count()),
            }
        }
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, format_value(&map[k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("(known after apply: {}.{})", binding, attr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_value_sorts_map_keys() {
        let value = Value::map([
            ("min_size", Value::Int(1)),
            ("desired_size", Value::Int(2)),
        ]);
        assert_eq!(format_value(&value), "{desired_size: 2, min_size: 1}");
    }

    #[test]
    fn format_value_marks_unknown_references() {
        let value = Value::List(vec![Value::ResourceRef("eks-sg".into(), "id".into())]);
        assert_eq!(format_value(&value), "[(known after apply: eks-sg.id)]");
    }

    #[test]
    fn format_value_compacts_policy_documents() {
        let policy = stack::trust_policy("eks.amazonaws.com");
        let formatted = format_value(&Value::String(policy));
        assert!(!formatted.contains('\n'));
        assert!(formatted.contains("\"Service\":\"eks.amazonaws.com\""));
    }

    #[test]
    fn format_value_summarizes_multiline_text() {
        let value = Value::string("a: 1\nb: 2\n");
        assert_eq!(format_value(&value), "<2 lines>");
    }

    #[test]
    fn schemas_cover_every_declared_type() {
        let schemas = get_schemas();
        let stack = minecraft_stack(&StackConfig::default());
        for resource in stack.resources() {
            assert!(
                schemas
                    .iter()
                    .any(|s| s.resource_type == resource.id.resource_type),
                "no schema for {}",
                resource.id.resource_type
            );
        }
    }
}
