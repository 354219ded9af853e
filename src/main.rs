//! Container Config - command line entry point

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use container_config::config::ResolverConfig;
use container_config::hub::estimate_parameters;
use container_config::manager::{
    ConfigurationManager, ExportOptions, MergedConfiguration, UserSelections,
};
use container_config::validation::{
    EnvValidationOptions, EnvVarValidationReport, ValidationResult,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "container-config")]
#[command(about = "Resolve model container configuration from registries and the HuggingFace Hub", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the registry directory
    #[arg(long, global = true)]
    registry_dir: Option<PathBuf>,

    /// Never contact the hub
    #[arg(long, global = true)]
    offline: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the merged configuration for a selection
    Resolve {
        #[command(flatten)]
        selections: SelectionArgs,

        /// Also run env var validation on the result
        #[arg(long)]
        validate_env: bool,
    },

    /// Check whether an instance type can run the resolved configuration
    ValidateInstance {
        #[command(flatten)]
        selections: SelectionArgs,

        /// Instance type to check (e.g. ml.g5.xlarge)
        #[arg(long = "instance")]
        instance: String,
    },

    /// Validate environment variables for the resolved configuration
    ValidateEnv {
        #[command(flatten)]
        selections: SelectionArgs,

        /// Extra or overriding variables as KEY=VALUE
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Skip the known flag registry
        #[arg(long)]
        no_known_flags: bool,

        /// Skip community reports
        #[arg(long)]
        no_community_reports: bool,

        /// Enable docker image introspection (experimental)
        #[arg(long)]
        docker_introspection: bool,
    },

    /// Export the resolved configuration as a registry contribution
    Export {
        #[command(flatten)]
        selections: SelectionArgs,

        #[arg(long)]
        deployment_succeeded: bool,

        #[arg(long)]
        inference_succeeded: bool,

        /// Instance type the configuration was tested on
        #[arg(long)]
        tested_instance_type: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Print only the submission instructions
        #[arg(long)]
        instructions: bool,
    },

    /// Show hub metadata for a model, or a registry overview
    Inspect {
        /// Model id to look up on the hub
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct SelectionArgs {
    /// Serving framework (e.g. vllm, sglang, tgi)
    #[arg(long)]
    framework: Option<String>,

    /// Framework version; defaults to the latest registered
    #[arg(long = "framework-version")]
    framework_version: Option<String>,

    #[arg(long)]
    framework_profile: Option<String>,

    /// Model id (e.g. meta-llama/Llama-3.1-8B-Instruct)
    #[arg(long = "model")]
    model_id: Option<String>,

    #[arg(long)]
    model_profile: Option<String>,
}

impl From<SelectionArgs> for UserSelections {
    fn from(args: SelectionArgs) -> Self {
        Self {
            framework: args.framework,
            framework_version: args.framework_version,
            framework_profile: args.framework_profile,
            model_id: args.model_id,
            model_profile: args.model_profile,
            instance_type: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Resolution {
    configuration: MergedConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_validation: Option<EnvVarValidationReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceCheck {
    instance_type: String,
    #[serde(flatten)]
    result: ValidationResult,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    // Load configuration
    let mut config = ResolverConfig::load(cli.config)?;

    // CLI overrides
    if let Some(dir) = cli.registry_dir {
        config.registry_dir = dir;
    }
    if cli.offline {
        config.hub.offline = true;
    }

    config.validate()?;

    tracing::info!(
        registry_dir = ?config.registry_dir,
        hub_endpoint = %config.hub.endpoint,
        offline = config.hub.offline,
        "Configuration loaded"
    );

    let manager =
        ConfigurationManager::from_config(&config).context("Failed to initialize resolver")?;

    match cli.command {
        Command::Resolve {
            selections,
            validate_env,
        } => {
            let configuration = manager.match_configuration(selections.into()).await?;
            let env_validation = if validate_env {
                Some(manager.validate_environment_variables(&configuration, None)?)
            } else {
                None
            };
            print_json(&Resolution {
                configuration,
                env_validation,
            })?;
            Ok(ExitCode::SUCCESS)
        }

        Command::ValidateInstance {
            selections,
            instance,
        } => {
            let selections = UserSelections {
                instance_type: Some(instance.clone()),
                ..UserSelections::from(selections)
            };
            let configuration = manager.match_configuration(selections).await?;
            let result =
                manager.validate_instance_type(&instance, &configuration.as_framework_config())?;
            let compatible = result.compatible;
            print_json(&InstanceCheck {
                instance_type: instance,
                result,
            })?;
            Ok(exit_code(compatible))
        }

        Command::ValidateEnv {
            selections,
            env,
            no_known_flags,
            no_community_reports,
            docker_introspection,
        } => {
            let mut configuration = manager.match_configuration(selections.into()).await?;
            configuration.env_vars.extend(env);

            let options = EnvValidationOptions {
                use_known_flags: !no_known_flags,
                use_community_reports: !no_community_reports,
                use_docker_introspection: docker_introspection,
            };
            let report = manager.validate_environment_variables(&configuration, Some(options))?;
            let valid = report.is_valid();
            print_json(&report)?;
            Ok(exit_code(valid))
        }

        Command::Export {
            selections,
            deployment_succeeded,
            inference_succeeded,
            tested_instance_type,
            notes,
            instructions,
        } => {
            let configuration = manager.match_configuration(selections.into()).await?;
            let options = ExportOptions {
                deployment_succeeded,
                inference_succeeded,
                tested_instance_type,
                notes,
            };
            let result = manager.export_configuration(&configuration, &options)?;
            if instructions {
                print!("{}", result.submission_instructions);
            } else {
                print_json(&result)?;
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Inspect { model: Some(model_id) } => {
            if manager.hub().is_offline() {
                anyhow::bail!("Cannot inspect '{model_id}' in offline mode");
            }
            let info = manager.hub().fetch_model_info(&model_id).await;
            let summary = info.summary();
            let parameters = summary.as_ref().and_then(estimate_parameters);

            print_json(&serde_json::json!({
                "modelId": &info.model_id,
                "pipelineTag": info.pipeline_tag(),
                "hasChatTemplate": info.chat_template().is_some(),
                "summary": summary,
                "estimatedParameters": parameters,
            }))?;
            Ok(exit_code(!info.is_empty()))
        }

        Command::Inspect { model: None } => {
            let registries = manager.registries()?;
            let frameworks: serde_json::Map<String, serde_json::Value> = registries
                .frameworks
                .iter()
                .map(|(name, versions)| {
                    let versions: Vec<&String> = versions.keys().collect();
                    (name.clone(), serde_json::json!(versions))
                })
                .collect();

            print_json(&serde_json::json!({
                "registryDir": config.registry_dir,
                "frameworks": frameworks,
                "modelPatterns": registries.models.keys().collect::<Vec<_>>(),
                "instanceTypes": registries.instances.keys().collect::<Vec<_>>(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
