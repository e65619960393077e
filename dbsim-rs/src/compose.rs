//! Compose template rendering.
//!
//! A stack definition is a template with an image-reference placeholder and
//! two credential-secret placeholders. Rendering substitutes all three,
//! persists the definition into the working directory, and writes the
//! credential values as two plaintext files the stack mounts as secrets.

use std::path::{Path, PathBuf};

use crate::errors::{HarnessError, Result};
use crate::session::Credentials;

pub const IMAGE_PLACEHOLDER: &str = "{{IMAGE}}";
pub const ADMIN_USER_PLACEHOLDER: &str = "{{ADMIN_USER_SECRET}}";
pub const ADMIN_PASS_PLACEHOLDER: &str = "{{ADMIN_PASS_SECRET}}";

const USER_SECRET_FILE: &str = "admin-username.txt";
const PASS_SECRET_FILE: &str = "admin-password.txt";

/// A running (or renderable) multi-service stack: the rendered definition,
/// the service names the compose tool reports for it, and the transient
/// secret files to strip on deletion.
#[derive(Clone, Debug)]
pub struct ComposeStack {
    pub file: PathBuf,
    pub services: Vec<String>,
    pub secrets: Vec<PathBuf>,
}

impl ComposeStack {
    /// Stack identity for sink naming, derived from the rendered file name.
    pub fn name(&self) -> String {
        self.file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "compose".to_string())
    }
}

/// Renders `template` into `workdir`, returning the rendered definition
/// path and the two secret files it references.
pub fn render(
    template: &Path,
    workdir: &Path,
    image: &str,
    credentials: &Credentials,
) -> Result<(PathBuf, Vec<PathBuf>)> {
    let text = std::fs::read_to_string(template)?;
    std::fs::create_dir_all(workdir)?;

    let user_file = workdir.join(USER_SECRET_FILE);
    let pass_file = workdir.join(PASS_SECRET_FILE);
    std::fs::write(&user_file, &credentials.username)?;
    std::fs::write(&pass_file, &credentials.password)?;

    let rendered = text
        .replace(IMAGE_PLACEHOLDER, image)
        .replace(ADMIN_USER_PLACEHOLDER, &user_file.display().to_string())
        .replace(ADMIN_PASS_PLACEHOLDER, &pass_file.display().to_string());

    let file_name = template
        .file_name()
        .ok_or_else(|| HarnessError::Config(format!("template path `{}` has no file name", template.display())))?;
    let out = workdir.join(file_name);
    std::fs::write(&out, rendered)?;

    Ok((out, vec![user_file, pass_file]))
}

/// Removes the transient secret files; already-missing files are fine.
pub fn remove_secrets(stack: &ComposeStack) -> Result<()> {
    for secret in &stack.secrets {
        match std::fs::remove_file(secret) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEMPLATE: &str = "services:\n  node1:\n    image: {{IMAGE}}\nsecrets:\n  admin_user:\n    file: {{ADMIN_USER_SECRET}}\n  admin_password:\n    file: {{ADMIN_PASS_SECRET}}\n";

    #[test]
    fn rendering_substitutes_placeholders_and_persists_secrets() {
        let dir = tempdir().expect("tempdir");
        let template = dir.path().join("stack.yaml");
        std::fs::write(&template, TEMPLATE).expect("write template");
        let workdir = dir.path().join("out");

        let credentials = Credentials::new("test_admin", "t0psecret");
        let (rendered, secrets) =
            render(&template, &workdir, "clusterdb:3.1", &credentials).expect("render");

        let text = std::fs::read_to_string(&rendered).expect("rendered file");
        assert!(text.contains("image: clusterdb:3.1"));
        assert!(!text.contains("{{"));

        assert_eq!(secrets.len(), 2);
        assert_eq!(
            std::fs::read_to_string(&secrets[0]).expect("user secret"),
            "test_admin"
        );
        assert_eq!(
            std::fs::read_to_string(&secrets[1]).expect("password secret"),
            "t0psecret"
        );
        // the rendered definition points at the persisted secrets
        assert!(text.contains(&secrets[0].display().to_string()));
    }

    #[test]
    fn secret_removal_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let secret = dir.path().join("admin-username.txt");
        std::fs::write(&secret, "user").expect("write");
        let stack = ComposeStack {
            file: dir.path().join("stack.yaml"),
            services: vec![],
            secrets: vec![secret.clone()],
        };
        remove_secrets(&stack).expect("first removal");
        remove_secrets(&stack).expect("second removal is a no-op");
        assert!(!secret.exists());
    }
}
