//! The releng build step catalogue.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use super::artifact::{Artifact, StepResult};
use super::context::BuildContext;
use super::graph::{GraphError, StepGraph, StepInput};
use crate::external::{run_checked, CommandSpec};

/// Target that requests every main step.
pub const ALL_TARGET: &str = "all";

type Input<'a> = StepInput<'a, BuildContext>;
type StepFn = fn(&Input<'_>) -> anyhow::Result<StepResult>;

const STD: [&str; 4] = ["poms", "jars", "strategoxt", "java"];

/// Build the step graph. Main steps are grouped under [`ALL_TARGET`];
/// `java-libs` and `eclipse-instances` must be requested explicitly.
pub fn releng_graph() -> Result<StepGraph<BuildContext>, GraphError> {
    let std_lang = with(&STD, "languages");
    let all_lang: Vec<&str> = std_lang.iter().copied().chain(["dynsem", "spt"]).collect();

    let main: [(&str, Vec<&str>, StepFn); 14] = [
        ("poms", vec![], build_poms),
        ("jars", vec!["poms"], build_premade_jars),
        ("strategoxt", vec!["poms", "jars"], build_or_download_strategoxt),
        ("java", vec!["poms", "jars", "strategoxt"], build_java),
        ("java-uber", STD.to_vec(), build_java_uber),
        ("language-prereqs", STD.to_vec(), build_language_prereqs),
        ("languages", with(&STD, "language-prereqs"), build_languages),
        ("dynsem", std_lang.clone(), build_dynsem),
        ("spt", std_lang.clone(), build_spt),
        ("eclipse-prereqs", all_lang.clone(), build_eclipse_prereqs),
        ("eclipse", with(&all_lang, "eclipse-prereqs"), build_eclipse),
        ("intellij-prereqs", all_lang.clone(), build_intellij_prereqs),
        ("intellij-jps", with(&all_lang, "intellij-prereqs"), build_intellij_jps),
        ("intellij", with(&all_lang, "intellij-jps"), build_intellij),
    ];

    let mut graph = StepGraph::new();
    let mut main_ids = Vec::with_capacity(main.len());
    for (id, deps, action) in main {
        graph.register_step(id, &deps, action)?;
        main_ids.push(id);
    }
    graph.register_target(ALL_TARGET, &main_ids)?;

    graph.register_step("java-libs", &["java"], build_java_libs)?;
    graph.register_step("eclipse-instances", &["eclipse"], build_eclipse_instances)?;
    Ok(graph)
}

fn with(base: &[&'static str], extra: &'static str) -> Vec<&'static str> {
    let mut deps = base.to_vec();
    deps.push(extra);
    deps
}

/// The single path matching `pattern`.
pub fn glob_one(pattern: &Path) -> anyhow::Result<PathBuf> {
    let pattern = pattern.to_string_lossy();
    let mut matches = glob::glob(&pattern)
        .with_context(|| format!("Invalid path pattern {pattern}"))?
        .filter_map(Result::ok);
    match matches.next() {
        Some(path) => Ok(path),
        None => bail!("Could not find path with pattern {pattern}"),
    }
}

fn build_poms(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven
        .run_in_dir(ctx.executor(), &ctx.path("releng/build/parent"), ctx.deploy_goal(), &[])?;
    Ok(StepResult::empty())
}

fn build_premade_jars(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    let cwd = ctx.path("releng/parent");
    let jar_dir = ctx.path("jsglr/make-permissive/jar");
    let mut properties = vec![
        ("pomFile", jar_dir.join("pom.xml").to_string_lossy().to_string()),
        ("file", jar_dir.join("make-permissive.jar").to_string_lossy().to_string()),
    ];

    let maven = ctx.maven.without_clean();
    maven.run_in_dir(ctx.executor(), &cwd, "install:install-file", &properties)?;
    if let Some(deployer) = &ctx.maven_deployer {
        properties.extend(deployer.local_file_deploy_properties());
        maven.run_in_dir(ctx.executor(), &cwd, "deploy:deploy-file", &properties)?;
    }
    Ok(StepResult::empty())
}

fn build_or_download_strategoxt(input: &Input<'_>) -> anyhow::Result<StepResult> {
    if input.context.build_stratego {
        build_strategoxt(input.context)
    } else {
        download_strategoxt(input.context)
    }
}

fn download_strategoxt(ctx: &BuildContext) -> anyhow::Result<StepResult> {
    // Downloading needs the snapshot repositories.
    let maven = ctx
        .maven
        .with_profile_removed("!add-metaborg-snapshot-repos")
        .without_clean();
    maven.run(
        ctx.executor(),
        &ctx.path("strategoxt/strategoxt"),
        Some("download-pom.xml"),
        "dependency:resolve",
        &[],
    )?;
    Ok(StepResult::empty())
}

fn build_strategoxt(ctx: &BuildContext) -> anyhow::Result<StepResult> {
    let dir = ctx.path("strategoxt/strategoxt");
    let build_file = if ctx.bootstrap_stratego {
        "bootstrap-pom.xml"
    } else {
        "build-pom.xml"
    };
    let skip_test = ctx.skip_tests || !ctx.test_stratego;
    ctx.maven.run(
        ctx.executor(),
        &dir,
        Some(build_file),
        ctx.deploy_goal(),
        &[("strategoxt-skip-test", skip_test.to_string())],
    )?;
    ctx.maven.run(
        ctx.executor(),
        &dir,
        Some("buildpoms/pom.xml"),
        ctx.deploy_goal(),
        &[
            ("strategoxt-skip-build", "true".to_string()),
            ("strategoxt-skip-assembly", "true".to_string()),
        ],
    )?;

    let distrib = if ctx.bootstrap_stratego {
        dir.join("buildpoms/bootstrap3/target")
    } else {
        dir.join("buildpoms/build/target")
    };
    Ok(StepResult::with_artifacts(vec![
        Artifact::new(
            "StrategoXT distribution",
            glob_one(&distrib.join("strategoxt-distrib-*-bin.tar"))?,
            "strategoxt/distrib.tar",
        )
        .with_package("strategoxt-distrib"),
        Artifact::new(
            "StrategoXT JAR",
            distrib.join("dist/share/strategoxt/strategoxt/strategoxt.jar"),
            "strategoxt/strategoxt.jar",
        )
        .with_package("strategoxt-jar"),
    ]))
}

fn build_java(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/java"),
        ctx.deploy_goal(),
        &[("forceContextQualifier", ctx.qualifier.clone())],
    )?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "Spoofax sunshine JAR",
        glob_one(&ctx.path(
            "spoofax-sunshine/org.metaborg.sunshine2/target/org.metaborg.sunshine2-*.jar",
        ))?,
        "spoofax/sunshine.jar",
    )
    .with_package("spoofax-sunshine")]))
}

fn build_java_uber(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    let cwd = ctx.path("spoofax/org.metaborg.spoofax.core.uber");
    ctx.maven
        .run_in_dir(ctx.executor(), &cwd, ctx.deploy_goal(), &[])?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "Spoofax uber JAR",
        glob_one(&cwd.join("target/org.metaborg.spoofax.core.uber-*.jar"))?,
        "spoofax/core-uber.jar",
    )
    .with_package("spoofax-core-uber")]))
}

fn build_java_libs(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    let cwd = ctx.path("releng/build/libs");
    ctx.maven
        .run_in_dir(ctx.executor(), &cwd, ctx.deploy_goal(), &[])?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "Spoofax libraries JAR",
        glob_one(&cwd.join("target/build.libs-*.jar"))?,
        "spoofax/libs.jar",
    )]))
}

fn build_language_prereqs(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/language/parent"),
        ctx.deploy_goal(),
        &[],
    )?;
    Ok(StepResult::empty())
}

fn build_languages(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/language"),
        ctx.deploy_goal(),
        &[],
    )?;
    Ok(StepResult::empty())
}

fn build_dynsem(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    // Always clean: the annotation processor breaks on incremental builds.
    ctx.maven.with_clean_first().run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/language/dynsem"),
        ctx.deploy_goal(),
        &[],
    )?;
    Ok(StepResult::empty())
}

fn build_spt(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/language/spt"),
        ctx.deploy_goal(),
        &[],
    )?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "SPT testrunner JAR",
        glob_one(&ctx.path("spt/org.metaborg.spt.cmd/target/org.metaborg.spt.cmd-*.jar"))?,
        "spoofax/testrunner.jar",
    )
    .with_package("spoofax-testrunner")]))
}

fn build_eclipse_prereqs(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/eclipse/deps"),
        ctx.deploy_goal(),
        &[("forceContextQualifier", ctx.qualifier.clone())],
    )?;
    Ok(StepResult::empty())
}

fn build_eclipse(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    // The update site is published as an artifact, never through Maven.
    ctx.maven.run_in_dir(
        ctx.executor(),
        &ctx.path("releng/build/eclipse"),
        "install",
        &[("forceContextQualifier", ctx.qualifier.clone())],
    )?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "Spoofax Eclipse update site",
        glob_one(&ctx.path(
            "spoofax-eclipse/org.metaborg.spoofax.eclipse.updatesite/target/org.metaborg.spoofax.eclipse.updatesite-*.zip",
        ))?,
        "spoofax-eclipse.zip",
    )]))
}

fn build_eclipse_instances(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    let generator = &ctx.instance_generator;
    let spec = CommandSpec::new(&generator.program)
        .args(generator.args.iter().cloned())
        .current_dir(&ctx.basedir)
        .streaming();
    tracing::info!(command = %spec, "Generating Eclipse instances");
    run_checked(ctx.executor(), &spec)?;

    let pattern = ctx
        .path(&generator.output_dir)
        .join(format!("{}-*", generator.archive_prefix));
    let pattern = pattern.to_string_lossy();
    let mut artifacts = Vec::new();
    for location in glob::glob(&pattern)
        .with_context(|| format!("Invalid path pattern {pattern}"))?
        .filter_map(Result::ok)
    {
        let Some(file_name) = location.file_name().map(|n| n.to_os_string()) else {
            continue;
        };
        artifacts.push(
            Artifact::new(
                "Spoofax Eclipse instance",
                &location,
                Path::new("spoofax/eclipse").join(file_name),
            )
            .with_package("spoofax-eclipse-installation"),
        );
    }
    if artifacts.is_empty() {
        bail!("Eclipse instance generation produced no archives matching {pattern}");
    }
    Ok(StepResult::with_artifacts(artifacts))
}

fn build_intellij_prereqs(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.gradle.run_in_dir(
        ctx.executor(),
        &ctx.path("spoofax-intellij/org.metaborg.jps-deps"),
        "publishToMavenLocal",
    )?;
    Ok(StepResult::empty())
}

fn build_intellij_jps(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    ctx.gradle.run_in_dir(
        ctx.executor(),
        &ctx.path("spoofax-intellij/org.metaborg.jps"),
        "install",
    )?;
    Ok(StepResult::empty())
}

fn build_intellij(input: &Input<'_>) -> anyhow::Result<StepResult> {
    let ctx = input.context;
    let cwd = ctx.path("spoofax-intellij/org.metaborg.intellij");
    ctx.gradle.run_in_dir(ctx.executor(), &cwd, "buildPlugin")?;
    Ok(StepResult::with_artifacts(vec![Artifact::new(
        "Spoofax for IntelliJ IDEA plugin",
        glob_one(&cwd.join("build/distributions/org.metaborg.intellij-*.zip"))?,
        "spoofax/intellij/plugin.zip",
    )
    .with_package("spoofax-intellij")]))
}
