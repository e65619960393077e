//! Container and compose-stack lifecycle against the engine CLI.
//!
//! Names are derived deterministically from the scenario name, so two
//! scenarios never collide and no locking is needed; an upgrade-style
//! secondary differs from its primary only by a fixed suffix. The
//! controller tracks everything it creates and force-removes it all in
//! `teardown_all`, which runs whether the scenario passed or not.

use std::mem;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::compose::{self, ComposeStack};
use crate::config::HarnessConfig;
use crate::errors::{HarnessError, Result};
use crate::pattern;
use crate::process::{ExitResult, ProcessRunner};
use crate::retry::poll_until;
use crate::session::Credentials;

/// Emitted once a node completes initial cluster configuration.
pub const READY_MARKER: &str = "Cluster config complete, marking node as ready";

pub const SECONDARY_SUFFIX: &str = "-2";
pub const MANAGE_PORT: u16 = 8002;
pub const HEALTH_PORT: u16 = 7997;

/// Where a named volume is mounted inside the product container.
const DATA_MOUNT_POINT: &str = "/var/opt/clusterdb";

/// Derives the container name for a scenario: the scenario name with all
/// whitespace stripped.
pub fn container_name(scenario: &str) -> String {
    scenario.split_whitespace().collect()
}

#[derive(Clone, Copy, Debug)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    pub const fn same(port: u16) -> Self {
        PortMapping {
            host: port,
            container: port,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContainerOptions {
    pub ports: Vec<PortMapping>,
    pub env: Vec<(String, String)>,
    pub extra_args: Vec<String>,
    /// Overrides the configured image when set.
    pub image: Option<String>,
}

pub struct ContainerController {
    config: HarnessConfig,
    runner: ProcessRunner,
    containers: Vec<String>,
    volumes: Vec<String>,
    stacks: Vec<ComposeStack>,
}

impl ContainerController {
    pub fn new(config: HarnessConfig) -> Self {
        let runner = ProcessRunner::new(&config.results_dir, config.process_timeout);
        ContainerController {
            config,
            runner,
            containers: Vec::new(),
            volumes: Vec::new(),
            stacks: Vec::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Creates a detached container and waits for it to report readiness.
    /// Fails with `ProcessFailure` on non-zero exit or non-empty stderr
    /// from the launch, then polls freshly fetched logs for the readiness
    /// marker.
    pub async fn create(&mut self, name: &str, opts: &ContainerOptions) -> Result<()> {
        let launch = self.launch(name, opts, None).await?;
        self.expect_clean_launch(name, &launch)?;
        self.wait_ready(name).await
    }

    /// Identical launch with the readiness and empty-stderr assertions
    /// suppressed — negative-path scenarios assert the expected failure
    /// mode themselves from the returned output.
    pub async fn create_failing(
        &mut self,
        name: &str,
        opts: &ContainerOptions,
    ) -> Result<ExitResult> {
        self.launch(name, opts, None).await
    }

    /// Like `create`, additionally attaching the named persistent volume
    /// at the product's data mount point.
    pub async fn create_with_volume(
        &mut self,
        name: &str,
        volume: &str,
        opts: &ContainerOptions,
    ) -> Result<()> {
        let launch = self.launch(name, opts, Some(volume)).await?;
        self.expect_clean_launch(name, &launch)?;
        self.wait_ready(name).await
    }

    /// Stands up the `-2`-suffixed secondary on the upgrade image against
    /// the primary's volume, for running two product versions side by side.
    /// Returns the secondary's name.
    pub async fn create_upgrade(
        &mut self,
        primary: &str,
        volume: &str,
        opts: &ContainerOptions,
    ) -> Result<String> {
        let name = format!("{primary}{SECONDARY_SUFFIX}");
        let mut opts = opts.clone();
        opts.image = Some(self.config.upgrade_image.clone());
        let launch = self.launch(&name, &opts, Some(volume)).await?;
        self.expect_clean_launch(&name, &launch)?;
        self.wait_ready(&name).await?;
        Ok(name)
    }

    async fn launch(
        &mut self,
        name: &str,
        opts: &ContainerOptions,
        volume: Option<&str>,
    ) -> Result<ExitResult> {
        let image = opts.image.clone().unwrap_or_else(|| self.config.image.clone());
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.into(),
        ];
        for mapping in &opts.ports {
            args.push("-p".into());
            args.push(format!("{}:{}", mapping.host, mapping.container));
        }
        let mut env = vec![
            ("ADMIN_USER".to_string(), self.config.admin.username.clone()),
            ("ADMIN_PASSWORD".to_string(), self.config.admin.password.clone()),
            ("LICENSE_KEY".to_string(), self.config.license_key.clone()),
            ("LICENSEE".to_string(), self.config.licensee.clone()),
        ];
        env.extend(opts.env.iter().cloned());
        for (key, value) in &env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        if let Some(volume) = volume {
            args.push("-v".into());
            args.push(format!("{volume}:{DATA_MOUNT_POINT}"));
            self.volumes.push(volume.to_string());
        }
        args.extend(opts.extra_args.iter().cloned());
        args.push(image);

        // tracked before the outcome is known, so teardown reaps
        // half-created containers too
        self.containers.push(name.to_string());
        info!(container = name, "launching");
        self.engine(&format!("{name}.run"), &args).await
    }

    fn expect_clean_launch(&self, name: &str, launch: &ExitResult) -> Result<()> {
        if !launch.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!(
                    "run of container {name} exited with {:?}: {}",
                    launch.status, launch.stderr
                ),
            ));
        }
        if !launch.stderr.trim().is_empty() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("run of container {name} wrote to stderr: {}", launch.stderr),
            ));
        }
        Ok(())
    }

    /// Fetches the container's combined log streams. Always re-queried,
    /// never cached — readiness polling depends on seeing fresh output.
    pub async fn logs(&self, name: &str) -> Result<String> {
        let result = self.engine(&format!("{name}.logs"), &["logs".into(), name.into()]).await?;
        if !result.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("logs of container {name}: {}", result.stderr),
            ));
        }
        // the engine relays container stdout/stderr on its own streams
        Ok(format!("{}{}", result.stdout, result.stderr))
    }

    /// Polls freshly fetched logs until the readiness marker appears.
    pub async fn wait_ready(&self, name: &str) -> Result<()> {
        info!(container = name, "waiting for readiness marker");
        let pattern = format!("*{READY_MARKER}*");
        poll_until(self.config.retry, |_| {
            let pattern = &pattern;
            async move {
                let logs = self.logs(name).await?;
                pattern::assert_glob(&logs, pattern, &format!("logs of container {name}"))
            }
        })
        .await
    }

    /// Polls a compose service's combined logs for the readiness marker.
    async fn wait_service_ready(&self, stack: &ComposeStack, service: &str) -> Result<()> {
        info!(service, "waiting for readiness marker");
        let file = stack.file.display().to_string();
        let sink = format!("{}.{service}.logs", stack.name());
        let pattern = format!("*{READY_MARKER}*");
        poll_until(self.config.retry, |_| {
            let (file, sink, pattern) = (&file, &sink, &pattern);
            async move {
                let result = self
                    .engine(sink, &["compose".into(), "-f".into(), file.clone(), "logs".into(), service.into()])
                    .await?;
                if !result.success() {
                    return Err(HarnessError::process(
                        &self.config.engine,
                        format!("compose logs of {service}: {}", result.stderr),
                    ));
                }
                let combined = format!("{}{}", result.stdout, result.stderr);
                pattern::assert_glob(&combined, pattern, &format!("logs of service {service}"))
            }
        })
        .await
    }

    /// Runs a command inside a running container.
    pub async fn exec(&self, name: &str, cmd: &[&str]) -> Result<ExitResult> {
        let mut args: Vec<String> = vec!["exec".into(), name.into()];
        args.extend(cmd.iter().map(|part| part.to_string()));
        self.engine(&format!("{name}.exec"), &args).await
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let result = self.engine(&format!("{name}.stop"), &["stop".into(), name.into()]).await?;
        if !result.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("stop of container {name}: {}", result.stderr),
            ));
        }
        Ok(())
    }

    /// Forceful removal, including anonymous volumes; succeeds whether the
    /// container is running, stopped, or already gone. Removes the `-2`
    /// secondary as well when asked.
    pub async fn delete(&mut self, name: &str, include_secondary: bool) -> Result<()> {
        self.remove_container(name).await?;
        if include_secondary {
            self.remove_container(&format!("{name}{SECONDARY_SUFFIX}")).await?;
        }
        Ok(())
    }

    async fn remove_container(&mut self, name: &str) -> Result<()> {
        let result = self
            .engine(&format!("{name}.rm"), &["rm".into(), "-f".into(), "-v".into(), name.into()])
            .await?;
        if !result.success() && !result.stderr.contains("No such container") {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("rm of container {name}: {}", result.stderr),
            ));
        }
        self.containers.retain(|tracked| tracked != name);
        Ok(())
    }

    pub async fn delete_volume(&mut self, name: &str) -> Result<()> {
        let result = self
            .engine(&format!("{name}.volume-rm"), &["volume".into(), "rm".into(), name.into()])
            .await?;
        if !result.success() && !result.stderr.contains("No such volume") {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("rm of volume {name}: {}", result.stderr),
            ));
        }
        self.volumes.retain(|tracked| tracked != name);
        Ok(())
    }

    /// Renders the template, persists definition and credential secrets,
    /// brings the stack up, enumerates its services, and — when asked —
    /// polls every service's logs for the readiness marker.
    pub async fn start_compose(
        &mut self,
        template: &Path,
        credentials: &Credentials,
        verify_readiness: bool,
    ) -> Result<ComposeStack> {
        let workdir = self.config.results_dir.join("compose");
        let (file, secrets) = compose::render(template, &workdir, &self.config.image, credentials)?;
        let file_arg = file.display().to_string();

        let mut stack = ComposeStack {
            file: file.clone(),
            services: Vec::new(),
            secrets,
        };
        let sink = stack.name();
        // tracked before `up` so teardown tears down a half-started stack
        self.stacks.push(stack.clone());

        let up = self
            .engine(
                &format!("{sink}.up"),
                &["compose".into(), "-f".into(), file_arg.clone(), "up".into(), "-d".into()],
            )
            .await?;
        if !up.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("compose up of {sink}: {}", up.stderr),
            ));
        }

        let services = self
            .engine(
                &format!("{sink}.services"),
                &["compose".into(), "-f".into(), file_arg, "ps".into(), "--services".into()],
            )
            .await?;
        if !services.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("compose ps of {sink}: {}", services.stderr),
            ));
        }
        stack.services = services
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(stack = %sink, services = ?stack.services, "stack is up");

        // keep the tracked copy's service list current for teardown
        if let Some(tracked) = self.stacks.last_mut() {
            *tracked = stack.clone();
        }

        if verify_readiness {
            for service in &stack.services {
                self.wait_service_ready(&stack, service).await?;
            }
        }
        Ok(stack)
    }

    pub async fn restart_compose(&self, stack: &ComposeStack) -> Result<()> {
        let file = stack.file.display().to_string();
        let result = self
            .engine(
                &format!("{}.restart", stack.name()),
                &["compose".into(), "-f".into(), file, "restart".into()],
            )
            .await?;
        if !result.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("compose restart of {}: {}", stack.name(), result.stderr),
            ));
        }
        Ok(())
    }

    /// Tears the stack down including volumes and strips the transient
    /// credential files.
    pub async fn delete_compose(&mut self, stack: &ComposeStack) -> Result<()> {
        let file = stack.file.display().to_string();
        let result = self
            .engine(
                &format!("{}.down", stack.name()),
                &["compose".into(), "-f".into(), file, "down".into(), "-v".into()],
            )
            .await?;
        if !result.success() {
            return Err(HarnessError::process(
                &self.config.engine,
                format!("compose down of {}: {}", stack.name(), result.stderr),
            ));
        }
        compose::remove_secrets(stack)?;
        self.stacks.retain(|tracked| tracked.file != stack.file);
        Ok(())
    }

    /// Force-removes every tracked stack, container, and volume. Failures
    /// are collected and returned, never swallowed, and never stop the
    /// remaining teardown.
    pub async fn teardown_all(&mut self) -> Vec<HarnessError> {
        let mut failures = Vec::new();

        for stack in mem::take(&mut self.stacks) {
            if let Err(err) = self.delete_compose(&stack).await {
                warn!(stack = %stack.name(), %err, "stack teardown failed");
                failures.push(err);
            }
        }
        for name in mem::take(&mut self.containers) {
            if let Err(err) = self.remove_container(&name).await {
                warn!(container = %name, %err, "container teardown failed");
                failures.push(err);
            }
        }
        for volume in mem::take(&mut self.volumes) {
            if let Err(err) = self.delete_volume(&volume).await {
                warn!(volume = %volume, %err, "volume teardown failed");
                failures.push(err);
            }
        }
        failures
    }

    async fn engine(&self, sink: &str, args: &[String]) -> Result<ExitResult> {
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run(sink, &self.config.engine, &borrowed).await
    }
}
