// SPDX-License-Identifier: PMPL-1.0-or-later

//! Built-in experiment catalog

use crate::types::*;

const MODES: &[&str] = &["one", "all"];
const DIRECTIONS: &[&str] = &["to", "from", "both"];

const NAMESPACE: ParamSpec = ParamSpec {
    name: "namespace",
    param_type: ParamType::Text,
    default: Some("default"),
    required: true,
    help: "Namespace holding the target pods",
};

const MODE: ParamSpec = ParamSpec {
    name: "mode",
    param_type: ParamType::Choice(MODES),
    default: Some("one"),
    required: true,
    help: "Affect one matching pod or all of them",
};

const fn duration(default: &'static str) -> ParamSpec {
    ParamSpec {
        name: DURATION_PARAM,
        param_type: ParamType::Duration,
        default: Some(default),
        required: true,
        help: "How long the fault stays active",
    }
}

static DEFINITIONS: &[ExperimentDefinition] = &[
    ExperimentDefinition {
        kind: ExperimentKind::PodFault,
        action: FaultAction::Kill,
        target: "pods labelled app=<target>",
        description: "Delete matching pods and let their controller recreate them.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "grace-period",
                param_type: ParamType::Integer { min: 0, max: 3600 },
                default: Some("0"),
                required: false,
                help: "Seconds the pod gets to shut down",
            },
        ],
        risk_summary: "Deletes the selected pods immediately. In-flight requests they were \
                       serving are dropped and the workload runs degraded until replacements \
                       are scheduled and ready.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::PodFault,
        action: FaultAction::Failure,
        target: "pods labelled app=<target>",
        description: "Make matching pods unavailable for a fixed window.",
        parameters: &[NAMESPACE, MODE, duration("30s")],
        risk_summary: "Replaces the pod's containers with a paused image for the whole window. \
                       The pods stay scheduled but serve nothing; readiness probes fail.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::PodFault,
        action: FaultAction::ContainerKill,
        target: "container in pods labelled app=<target>",
        description: "Kill one named container inside matching pods.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "container",
                param_type: ParamType::Text,
                default: None,
                required: true,
                help: "Name of the container to kill",
            },
        ],
        risk_summary: "Kills the named container. Sidecars and shared volumes may be left in an \
                       inconsistent state until the kubelet restarts it.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::NetworkFault,
        action: FaultAction::Delay,
        target: "network traffic of pods labelled app=<target>",
        description: "Add latency to every packet leaving matching pods.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "latency",
                param_type: ParamType::Duration,
                default: Some("10ms"),
                required: true,
                help: "Delay added to each packet",
            },
            ParamSpec {
                name: "jitter",
                param_type: ParamType::Duration,
                default: Some("0ms"),
                required: false,
                help: "Random variation around the latency",
            },
            ParamSpec {
                name: "correlation",
                param_type: ParamType::Percent,
                default: Some("100"),
                required: false,
                help: "Correlation between consecutive delays",
            },
            duration("30s"),
        ],
        risk_summary: "Slows every outbound packet of the selected pods. Timeouts and retries \
                       upstream may cascade into wider latency or errors.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::NetworkFault,
        action: FaultAction::Loss,
        target: "network traffic of pods labelled app=<target>",
        description: "Drop a share of packets leaving matching pods.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "loss",
                param_type: ParamType::Percent,
                default: Some("25"),
                required: true,
                help: "Share of packets dropped",
            },
            ParamSpec {
                name: "correlation",
                param_type: ParamType::Percent,
                default: Some("0"),
                required: false,
                help: "Correlation between consecutive drops",
            },
            duration("30s"),
        ],
        risk_summary: "Drops packets from the selected pods. Connections stall and \
                       retransmit; clients without timeouts can hang.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::NetworkFault,
        action: FaultAction::Partition,
        target: "traffic between app=<target> and its peer",
        description: "Cut traffic between matching pods and a peer workload.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "peer",
                param_type: ParamType::Text,
                default: None,
                required: true,
                help: "app label of the workload on the other side",
            },
            ParamSpec {
                name: "direction",
                param_type: ParamType::Choice(DIRECTIONS),
                default: Some("to"),
                required: true,
                help: "Which direction of traffic is cut",
            },
            duration("30s"),
        ],
        risk_summary: "Blackholes traffic between the two workloads. Quorum-based systems may \
                       elect new leaders or refuse writes until the partition heals.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::StressFault,
        action: FaultAction::Cpu,
        target: "CPU of pods labelled app=<target>",
        description: "Burn CPU inside matching pods.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "workers",
                param_type: ParamType::Integer { min: 1, max: 64 },
                default: Some("1"),
                required: true,
                help: "Number of stress workers",
            },
            ParamSpec {
                name: "load",
                param_type: ParamType::Percent,
                default: Some("50"),
                required: true,
                help: "Target load per worker",
            },
            duration("30s"),
        ],
        risk_summary: "Consumes CPU inside the selected pods. Throttling can starve the \
                       application and neighbouring pods on the same node.",
    },
    ExperimentDefinition {
        kind: ExperimentKind::StressFault,
        action: FaultAction::Memory,
        target: "memory of pods labelled app=<target>",
        description: "Allocate memory inside matching pods.",
        parameters: &[
            NAMESPACE,
            MODE,
            ParamSpec {
                name: "workers",
                param_type: ParamType::Integer { min: 1, max: 64 },
                default: Some("1"),
                required: true,
                help: "Number of stress workers",
            },
            ParamSpec {
                name: "size",
                param_type: ParamType::Text,
                default: Some("256MB"),
                required: true,
                help: "Memory each worker allocates (e.g. 256MB, 1GB)",
            },
            duration("30s"),
        ],
        risk_summary: "Allocates memory inside the selected pods. The OOM killer may terminate \
                       the application container rather than the stressor.",
    },
];

/// Static registry of experiment definitions
#[derive(Debug, Clone, Copy)]
pub struct ExperimentCatalog {
    definitions: &'static [ExperimentDefinition],
}

impl Default for ExperimentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExperimentCatalog {
    pub fn builtin() -> Self {
        Self {
            definitions: DEFINITIONS,
        }
    }

    pub fn definitions(&self) -> &'static [ExperimentDefinition] {
        self.definitions
    }

    pub fn get(&self, index: usize) -> Option<&'static ExperimentDefinition> {
        self.definitions.get(index)
    }

    pub fn find(
        &self,
        kind: ExperimentKind,
        action: FaultAction,
    ) -> Option<&'static ExperimentDefinition> {
        self.definitions
            .iter()
            .find(|def| def.kind == kind && def.action == action)
    }

    pub fn index_of(&self, kind: ExperimentKind, action: FaultAction) -> Option<usize> {
        self.definitions
            .iter()
            .position(|def| def.kind == kind && def.action == action)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
