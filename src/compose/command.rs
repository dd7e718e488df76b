//! Compose invocation construction
//!
//! Pure translation from an [`EnvironmentDescriptor`] plus verb arguments
//! into a `docker compose` argument vector and child environment. Kept
//! free of process execution so the translation is directly testable.

use crate::env::{EnvironmentDescriptor, EnvironmentMode};
use std::collections::BTreeMap;

/// The external container orchestration binary
pub const DOCKER_BIN: &str = "docker";

/// One fully-assembled external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInvocation {
    /// Program to execute
    pub program: String,
    /// Argument vector
    pub args: Vec<String>,
    /// Environment for the child process
    pub env: BTreeMap<String, String>,
}

/// Build a `docker compose` invocation scoped to the descriptor, with the
/// overlays applied in descriptor order and `compose_args` appended
/// verbatim.
pub fn invocation(
    descriptor: &EnvironmentDescriptor,
    compose_args: &[String],
) -> ComposeInvocation {
    let mut args = vec![
        "compose".to_string(),
        "-p".to_string(),
        descriptor.project.clone(),
    ];
    for overlay in &descriptor.overlays {
        args.push("-f".to_string());
        args.push(overlay.display().to_string());
    }
    args.extend(compose_args.iter().cloned());

    let mut env = descriptor.variables.clone();
    if let EnvironmentMode::Remote { ref host } = descriptor.mode {
        // docker control is tunnelled over ssh; the transport itself is
        // docker's concern
        env.insert("DOCKER_HOST".to_string(), format!("ssh://{}", host));
    }

    ComposeInvocation {
        program: DOCKER_BIN.to_string(),
        args,
        env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor() -> EnvironmentDescriptor {
        EnvironmentDescriptor {
            name: "local".into(),
            project: "shop".into(),
            base_dir: PathBuf::from("/home/dev/shop"),
            overlays: vec![PathBuf::from("/share/a.yml"), PathBuf::from("/proj/b.yml")],
            variables: BTreeMap::from([("DC_ORO_PHP_VERSION".into(), "8.3".into())]),
            mode: EnvironmentMode::Local,
        }
    }

    #[test]
    fn test_overlays_in_descriptor_order() {
        let inv = invocation(&descriptor(), &["up".into(), "-d".into()]);
        assert_eq!(inv.program, "docker");
        assert_eq!(
            inv.args,
            vec![
                "compose",
                "-p",
                "shop",
                "-f",
                "/share/a.yml",
                "-f",
                "/proj/b.yml",
                "up",
                "-d"
            ]
        );
        assert_eq!(inv.env["DC_ORO_PHP_VERSION"], "8.3");
        assert!(!inv.env.contains_key("DOCKER_HOST"));
    }

    #[test]
    fn test_remote_mode_sets_docker_host() {
        let mut d = descriptor();
        d.mode = EnvironmentMode::Remote {
            host: "deploy@staging".into(),
        };
        let inv = invocation(&d, &["ps".into()]);
        assert_eq!(inv.env["DOCKER_HOST"], "ssh://deploy@staging");
    }
}
