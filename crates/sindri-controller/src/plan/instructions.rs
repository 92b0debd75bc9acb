/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Instructions
//!
//! The closed set of commands Sindri sends to a machine's agent, and the wire
//! form they render to.
//!
//! Instructions that carry values from a resource (snapshot names and
//! locations, restore paths, addresses) hand them to the agent as separate
//! arguments; only fixed scripts go through `/bin/sh -c`. The rendered
//! [`Plan`] has a fixed field order and no maps, so the same instruction list
//! always serializes to the same bytes.

use serde::{Deserialize, Serialize};

const SHELL: &str = "/bin/sh";
const RKE2: &str = "rke2";
const RKE2_SERVICE: &str = "rke2-server.service";
const RKE2_CONFIG: &str = "/etc/rancher/rke2/config.yaml";
const RKE2_ETCD_DATA: &str = "/var/lib/rancher/rke2/server/db/etcd";
const RKE2_POD_MANIFESTS: &str = "/var/lib/rancher/rke2/agent/pod-manifests";
/// Supervisor port new servers register against
const RKE2_SUPERVISOR_PORT: u16 = 9345;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Take an etcd snapshot; RKE2 suffixes `name` with node and timestamp
    TakeSnapshot {
        name: String,
        location: Option<String>,
    },
    StopAgent,
    RemoveServerUrl,
    /// Point the node at the server it should join
    SetServerUrl(String),
    RemoveEtcdData,
    RemoveManifests,
    StartAgent,
    RestoreFromSnapshot(String),
}

impl Instruction {
    /// Instruction name; the key of its captured output.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::TakeSnapshot { .. } => "etcd-snapshot",
            Instruction::StopAgent => "stop-agent",
            Instruction::RemoveServerUrl => "remove-server-url",
            Instruction::SetServerUrl(_) => "set-server-url",
            Instruction::RemoveEtcdData => "remove-etcd-data",
            Instruction::RemoveManifests => "remove-manifests",
            Instruction::StartAgent => "start-agent",
            Instruction::RestoreFromSnapshot(_) => "etcd-restore",
        }
    }

    /// Command and argument vector the agent executes.
    fn invocation(&self) -> (&'static str, Vec<String>) {
        match self {
            Instruction::TakeSnapshot { name, location } => {
                let mut args = vec![
                    "etcd-snapshot".to_string(),
                    "save".to_string(),
                    "--name".to_string(),
                    name.clone(),
                ];
                if let Some(dir) = location {
                    args.push("--etcd-snapshot-dir".to_string());
                    args.push(dir.clone());
                }
                (RKE2, args)
            }
            Instruction::RestoreFromSnapshot(path) => (
                RKE2,
                vec![
                    "server".to_string(),
                    "--cluster-reset".to_string(),
                    format!("--cluster-reset-restore-path={}", path),
                ],
            ),
            // The address arrives as `$1` and is never parsed as script text
            Instruction::SetServerUrl(address) => (
                SHELL,
                vec![
                    "-c".to_string(),
                    format!(
                        "echo \"server: https://$1:{}\" >> {}",
                        RKE2_SUPERVISOR_PORT, RKE2_CONFIG
                    ),
                    SHELL.to_string(),
                    address.clone(),
                ],
            ),
            Instruction::StopAgent => shell(format!("systemctl stop {}", RKE2_SERVICE)),
            Instruction::RemoveServerUrl => shell(format!("sed -i '/^server:/d' {}", RKE2_CONFIG)),
            Instruction::RemoveEtcdData => shell(format!("rm -rf {}", RKE2_ETCD_DATA)),
            Instruction::RemoveManifests => shell(format!("rm -f {}/*", RKE2_POD_MANIFESTS)),
            Instruction::StartAgent => shell(format!("systemctl start {}", RKE2_SERVICE)),
        }
    }

    fn saves_output(&self) -> bool {
        matches!(
            self,
            Instruction::TakeSnapshot { .. } | Instruction::RestoreFromSnapshot(_)
        )
    }

    /// Renders the instruction to its wire shape.
    pub fn render(&self) -> PlanInstruction {
        let (command, args) = self.invocation();
        PlanInstruction {
            name: self.name().to_string(),
            image: None,
            env: None,
            args,
            command: command.to_string(),
            save_output: self.saves_output(),
        }
    }
}

fn shell(script: String) -> (&'static str, Vec<String>) {
    (SHELL, vec!["-c".to_string(), script])
}

/// One instruction as the agent reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInstruction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    pub args: Vec<String>,
    pub command: String,
    pub save_output: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub instructions: Vec<PlanInstruction>,
}

impl Plan {
    pub fn new(instructions: &[Instruction]) -> Self {
        Plan {
            instructions: instructions.iter().map(Instruction::render).collect(),
        }
    }

    /// Canonical serialized form; this is what gets checksummed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.instructions.iter().map(|i| i.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_instruction_with_location() {
        let rendered = Instruction::TakeSnapshot {
            name: "nightly-m1".to_string(),
            location: Some("/mnt/backup".to_string()),
        }
        .render();

        assert_eq!(rendered.command, "rke2");
        assert_eq!(
            rendered.args,
            vec![
                "etcd-snapshot",
                "save",
                "--name",
                "nightly-m1",
                "--etcd-snapshot-dir",
                "/mnt/backup"
            ]
        );
        assert!(rendered.save_output);
    }

    #[test]
    fn test_snapshot_without_location_uses_rke2_default_dir() {
        let rendered = Instruction::TakeSnapshot {
            name: "nightly-m1".to_string(),
            location: None,
        }
        .render();

        assert_eq!(rendered.args, vec!["etcd-snapshot", "save", "--name", "nightly-m1"]);
    }

    #[test]
    fn test_hostile_values_stay_single_arguments() {
        let location = "/mnt/my backups; touch /tmp/owned";
        let rendered = Instruction::TakeSnapshot {
            name: "n-m1".to_string(),
            location: Some(location.to_string()),
        }
        .render();
        assert_eq!(rendered.command, "rke2");
        assert_eq!(rendered.args.len(), 6);
        assert_eq!(rendered.args.last().unwrap(), location);

        let path = "/var/lib/rancher/rke2/server/db/snapshots/a b;reboot";
        let rendered = Instruction::RestoreFromSnapshot(path.to_string()).render();
        assert_eq!(rendered.command, "rke2");
        assert_eq!(
            rendered.args,
            vec![
                "server".to_string(),
                "--cluster-reset".to_string(),
                format!("--cluster-reset-restore-path={}", path),
            ]
        );

        let rendered = Instruction::SetServerUrl("10.0.0.5; reboot".to_string()).render();
        assert!(!rendered.args[1].contains("reboot"));
        assert_eq!(rendered.args.last().unwrap(), "10.0.0.5; reboot");
    }

    #[test]
    fn test_set_server_url_targets_supervisor_port() {
        let rendered = Instruction::SetServerUrl("10.0.0.5".to_string()).render();
        assert_eq!(rendered.command, "/bin/sh");
        assert_eq!(
            rendered.args,
            vec![
                "-c",
                "echo \"server: https://$1:9345\" >> /etc/rancher/rke2/config.yaml",
                "/bin/sh",
                "10.0.0.5"
            ]
        );
        assert!(!rendered.save_output);
    }

    #[test]
    fn test_wire_shape_is_camel_case_without_empty_optionals() {
        let plan = Plan::new(&[Instruction::StopAgent]);
        let json = String::from_utf8(plan.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"instructions":[{"name":"stop-agent","args":["-c","systemctl stop rke2-server.service"],"command":"/bin/sh","saveOutput":false}]}"#
        );
    }

    #[test]
    fn test_instruction_names_are_unique() {
        let all = [
            Instruction::TakeSnapshot {
                name: "s".to_string(),
                location: None,
            },
            Instruction::StopAgent,
            Instruction::RemoveServerUrl,
            Instruction::SetServerUrl("a".to_string()),
            Instruction::RemoveEtcdData,
            Instruction::RemoveManifests,
            Instruction::StartAgent,
            Instruction::RestoreFromSnapshot("p".to_string()),
        ];
        let mut names: Vec<&str> = all.iter().map(Instruction::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
