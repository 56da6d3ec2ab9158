use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::RelengConfig;
use crate::state::WorkflowKind;

pub mod commands;

use commands::bootstrap::BootstrapCommand;
use commands::build::{maven_opts, BuildCommand};
use commands::release::ReleaseCommand;
use commands::repo::{QualifierCommand, RepoAction, RepoCommand};
use commands::state::{StateResetCommand, StateShowCommand};
use commands::{CommandContext, Exit};

#[derive(Parser)]
#[command(name = "releng")]
#[command(version)]
#[command(about = "Release engineering for multi-repository builds")]
#[command(long_about = "Builds components of a repository with submodules in dependency order, \
                       and drives resumable release and bootstrap workflows that pause at checkpoints \
                       and continue on the next invocation.")]
pub struct Cli {
    /// Repository to operate on
    #[arg(long, short = 'r', global = true, default_value = ".", help = "Root of the repository with submodules")]
    pub repo: PathBuf,

    /// Log output format
    #[arg(long, global = true, help = "Log format: pretty or json (defaults to configuration)")]
    pub log_format: Option<String>,

    /// Log filter
    #[arg(long, global = true, help = "Log level or filter, overridden by RUST_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build one or more components in dependency order
    Build(BuildArgs),
    /// Release the development branch onto the release branch and deploy it
    Release(ReleaseArgs),
    /// Build and deploy a new baseline of the bootstrapped languages
    Bootstrap {
        /// Current Maven version
        #[arg(long = "cur-ver", help = "Current Maven version, e.g. 2.1.0-SNAPSHOT")]
        cur_version: String,
        /// Current baseline version
        #[arg(long = "cur-base-ver", help = "Current baseline version to replace")]
        cur_baseline_version: String,
        /// Deploy kind for the baseline deployment
        #[arg(long, default_value = "release", help = "Deploy kind used for the baseline deployment")]
        deploy_kind: String,
        /// Forget bootstrap progress
        #[arg(long, help = "Delete the persisted bootstrap state and exit")]
        reset: bool,
    },
    /// Inspect or reset persisted workflow state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Check out the configured branch of every submodule
    Checkout {
        #[arg(short = 'y', long, help = "Answer warning prompts with yes")]
        yes: bool,
    },
    /// Initialize and update every submodule
    Update,
    /// Push the current branch of every submodule
    Push {
        #[arg(short = 'y', long, help = "Answer warning prompts with yes")]
        yes: bool,
    },
    /// Remove untracked files in every submodule
    Clean {
        #[arg(short = 'y', long, help = "Answer warning prompts with yes")]
        yes: bool,
    },
    /// Hard reset every submodule
    Reset {
        #[arg(long, help = "Reset to the remote branch, deleting unpushed commits")]
        remote: bool,
        #[arg(short = 'y', long, help = "Answer warning prompts with yes")]
        yes: bool,
    },
    /// Create a tag in every submodule
    Tag {
        /// Name of the tag
        name: String,
        #[arg(long, help = "Tag message, defaults to the tag name")]
        description: Option<String>,
        #[arg(short = 'y', long, help = "Answer warning prompts with yes")]
        yes: bool,
    },
    /// Print the build qualifier
    Qualifier {
        #[arg(long, help = "Use the current time instead of the latest commit date")]
        now: bool,
    },
}

#[derive(Subcommand)]
pub enum StateAction {
    /// Print the persisted state of a workflow
    Show {
        #[arg(help = "release or bootstrap")]
        workflow: WorkflowKind,
    },
    /// Delete the persisted state of a workflow
    Reset {
        #[arg(help = "release or bootstrap")]
        workflow: WorkflowKind,
    },
}

#[derive(Args)]
pub struct BuildArgs {
    /// Components to build; lists the available ones when empty
    pub components: Vec<String>,

    #[arg(long, help = "Build only the given components, not their dependencies")]
    pub no_deps: bool,
    #[arg(long = "deploy", help = "Deploy artifacts using the named deploy kind")]
    pub deploy_kind: Option<String>,
    #[arg(long, help = "Copy produced artifacts to this directory")]
    pub copy_artifacts: Option<PathBuf>,
    #[arg(long, conflicts_with = "now_qualifier", help = "Qualifier to use")]
    pub qualifier: Option<String>,
    #[arg(long, help = "Use the current time as qualifier instead of the latest commit date")]
    pub now_qualifier: bool,
    #[arg(long, help = "Generate and attach JavaDoc for Java projects")]
    pub generate_javadoc: bool,
    #[arg(long, conflicts_with = "no_deps", help = "Remove artifacts from the local Maven repository first")]
    pub clean_repo: bool,

    #[arg(long, help = "Build StrategoXT instead of downloading it")]
    pub build_stratego: bool,
    #[arg(long, help = "Bootstrap StrategoXT instead of building it")]
    pub bootstrap_stratego: bool,
    #[arg(long, help = "Skip StrategoXT tests")]
    pub no_stratego_test: bool,

    #[arg(long, help = "Do not run the clean phase in Maven builds")]
    pub no_clean: bool,
    #[arg(long, help = "Skip tests")]
    pub skip_tests: bool,
    #[arg(long, help = "Maven settings file")]
    pub settings: Option<PathBuf>,
    #[arg(long, help = "Global Maven settings file")]
    pub global_settings: Option<PathBuf>,
    #[arg(long, help = "Local Maven repository")]
    pub local_repository: Option<PathBuf>,
    #[arg(long, help = "Run Maven and Gradle offline")]
    pub offline: bool,
    #[arg(long, conflicts_with = "quiet", help = "Pass --debug and --errors to Maven")]
    pub debug: bool,
    #[arg(long, help = "Pass --quiet to Maven")]
    pub quiet: bool,
    #[arg(long, default_value = "16M", help = "JVM stack size")]
    pub stack: String,
    #[arg(long, default_value = "2G", help = "JVM minimum heap size")]
    pub min_heap: String,
    #[arg(long, default_value = "2G", help = "JVM maximum heap size")]
    pub max_heap: String,

    #[arg(long, help = "Gradle does not use native services")]
    pub no_native: bool,
    #[arg(long, help = "Gradle does not use its build daemon")]
    pub no_daemon: bool,

    #[command(flatten)]
    pub bintray: BintrayArgs,
    #[arg(long, help = "Version to deploy to the binary repository; deployment is skipped when unset")]
    pub bintray_version: Option<String>,
}

#[derive(Args)]
pub struct BintrayArgs {
    #[arg(long, help = "Binary repository username, defaults to BINTRAY_USERNAME")]
    pub bintray_username: Option<String>,
    #[arg(long, help = "Binary repository key, defaults to BINTRAY_KEY")]
    pub bintray_key: Option<String>,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Git branch to release to
    pub release_branch: String,
    /// Maven version for the release branch
    pub next_release_version: String,
    /// Git development branch to release from
    pub develop_branch: String,
    /// Current Maven version of the development branch
    pub cur_develop_version: String,

    #[arg(long, help = "Deploy kind of the release")]
    pub deploy_kind: String,
    #[arg(long, help = "Maven version to set on the development branch afterwards")]
    pub next_develop_version: Option<String>,
    #[arg(long, help = "Run every step without pausing; any failure is fatal")]
    pub non_interactive: bool,
    #[arg(long, help = "Run every step but skip pushing")]
    pub dry_run: bool,
    #[arg(long, conflicts_with = "revert_release", help = "Delete the persisted release state and exit")]
    pub reset_release: bool,
    #[arg(long, help = "Reset both branches to their remote state and delete the release state")]
    pub revert_release: bool,
    #[arg(long, help = "Bootstrap StrategoXT instead of building it")]
    pub bootstrap_stratego: bool,
    #[arg(long, help = "Skip StrategoXT tests")]
    pub no_stratego_test: bool,
    #[command(flatten)]
    pub bintray: BintrayArgs,
}

impl BuildArgs {
    fn into_command(self, context: &CommandContext) -> BuildCommand {
        let mut options = context.config.build_options();
        options.clean = !self.no_clean;
        options.skip_tests = self.skip_tests;
        options.offline |= self.offline;
        options.debug |= self.debug;
        options.quiet |= self.quiet;
        options.qualifier = self.qualifier;
        options.copy_artifacts_to = self.copy_artifacts;
        options.generate_javadoc = self.generate_javadoc;
        options.build_stratego = self.build_stratego;
        options.bootstrap_stratego = self.bootstrap_stratego;
        options.test_stratego = !self.no_stratego_test;
        options.maven_clean_local_repo = self.clean_repo;
        options.maven_opts = Some(maven_opts(&self.stack, &self.min_heap, &self.max_heap));
        options.gradle_no_native |= self.no_native;
        if self.no_daemon {
            options.gradle_daemon = Some(false);
        }
        options.bintray_version = self.bintray_version;
        override_path(&mut options.maven_settings_file, self.settings);
        override_path(&mut options.maven_global_settings_file, self.global_settings);
        override_path(&mut options.maven_local_repo, self.local_repository);

        BuildCommand::new(self.components, options)
            .with_dependencies(!self.no_deps)
            .with_deploy_kind(self.deploy_kind)
            .with_now_qualifier(self.now_qualifier)
            .with_bintray_credentials(self.bintray.bintray_username, self.bintray.bintray_key)
    }
}

fn override_path(target: &mut Option<PathBuf>, value: Option<PathBuf>) {
    if value.is_some() {
        *target = value;
    }
}

impl ReleaseArgs {
    fn into_command(self) -> ReleaseCommand {
        ReleaseCommand::new(
            self.release_branch,
            self.next_release_version,
            self.develop_branch,
            self.cur_develop_version,
            self.deploy_kind,
        )
        .with_next_develop_version(self.next_develop_version)
        .with_non_interactive(self.non_interactive)
        .with_dry_run(self.dry_run)
        .with_reset(self.reset_release)
        .with_revert(self.revert_release)
        .with_stratego(self.bootstrap_stratego, !self.no_stratego_test)
        .with_bintray_credentials(self.bintray.bintray_username, self.bintray.bintray_key)
    }
}

/// Dispatch a parsed command line.
pub fn run(command: Commands, repo: PathBuf, config: RelengConfig) -> Result<Exit> {
    let context = CommandContext::new(repo, config);
    match command {
        Commands::Build(args) => args.into_command(&context).execute(&context),
        Commands::Release(args) => args.into_command().execute(&context),
        Commands::Bootstrap {
            cur_version,
            cur_baseline_version,
            deploy_kind,
            reset,
        } => BootstrapCommand::new(cur_version, cur_baseline_version)
            .with_deploy_kind(deploy_kind)
            .with_reset(reset)
            .execute(&context),
        Commands::State { action } => match action {
            StateAction::Show { workflow } => StateShowCommand::new(workflow).execute(&context),
            StateAction::Reset { workflow } => StateResetCommand::new(workflow).execute(&context),
        },
        Commands::Checkout { yes } => RepoCommand::new(RepoAction::Checkout)
            .with_assume_yes(yes)
            .execute(&context),
        Commands::Update => RepoCommand::new(RepoAction::Update).execute(&context),
        Commands::Push { yes } => RepoCommand::new(RepoAction::Push)
            .with_assume_yes(yes)
            .execute(&context),
        Commands::Clean { yes } => RepoCommand::new(RepoAction::Clean)
            .with_assume_yes(yes)
            .execute(&context),
        Commands::Reset { remote, yes } => RepoCommand::new(RepoAction::Reset { to_remote: remote })
            .with_assume_yes(yes)
            .execute(&context),
        Commands::Tag {
            name,
            description,
            yes,
        } => RepoCommand::new(RepoAction::Tag { name, description })
            .with_assume_yes(yes)
            .execute(&context),
        Commands::Qualifier { now } => QualifierCommand::new().with_now(now).execute(&context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_release_arguments() {
        let cli = Cli::try_parse_from([
            "releng",
            "--repo",
            "/work/spoofax-releng",
            "release",
            "master",
            "2.0.0",
            "develop",
            "2.0.0-SNAPSHOT",
            "--deploy-kind",
            "release",
            "--non-interactive",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.repo, PathBuf::from("/work/spoofax-releng"));
        let Commands::Release(args) = cli.command else {
            panic!("expected release command");
        };
        let command = args.into_command();
        assert_eq!(command.release_branch, "master");
        assert_eq!(command.cur_develop_version, "2.0.0-SNAPSHOT");
        assert!(command.non_interactive);
        assert!(command.dry_run);
        assert!(command.test_stratego);
    }

    #[test]
    fn test_reset_and_revert_conflict() {
        let result = Cli::try_parse_from([
            "releng",
            "release",
            "master",
            "2.0.0",
            "develop",
            "2.0.0-SNAPSHOT",
            "--deploy-kind",
            "release",
            "--reset-release",
            "--revert-release",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_flags_map_onto_options() {
        let cli = Cli::try_parse_from([
            "releng",
            "build",
            "languages",
            "spt",
            "--no-deps",
            "--skip-tests",
            "--no-clean",
            "--no-daemon",
            "--max-heap",
            "4G",
        ])
        .unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.components, vec!["languages", "spt"]);
        assert!(args.no_deps);

        let context = CommandContext::new("/work/spoofax-releng", RelengConfig::default());
        let command = args.into_command(&context);
        let options = command.options();
        assert!(options.skip_tests);
        assert!(!options.clean);
        assert!(options.test_stratego);
        assert_eq!(options.gradle_daemon, Some(false));
        assert_eq!(options.maven_opts.as_deref(), Some("-Xss16M -Xms2G -Xmx4G"));
    }

    #[test]
    fn test_state_show_parses_workflow_kind() {
        let cli = Cli::try_parse_from(["releng", "state", "show", "bootstrap"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::State {
                action: StateAction::Show {
                    workflow: WorkflowKind::Bootstrap
                }
            }
        ));
        assert!(Cli::try_parse_from(["releng", "state", "show", "deploy"]).is_err());
    }
}
