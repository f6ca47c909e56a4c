//! Per-module production step sequences
//!
//! The planned command sequence for each processing module. Execution is
//! driven by the workflow manager; every step of one sequence shares the
//! workflow's orderId and receives a strictly increasing orderUpdateId.

/// One planned step of a module sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStep {
    /// Step/command name (`PICK`, `DRILL`, …)
    pub name: &'static str,

    /// Topic suffix the step publishes to
    pub topic: &'static str,

    /// Template key of the step payload
    pub template: &'static str,

    /// Dashboard icon hint
    pub icon: &'static str,
}

const fn step(name: &'static str, icon: &'static str) -> SequenceStep {
    SequenceStep {
        name,
        topic: "order",
        template: "module.order",
        icon,
    }
}

/// Planned command sequence for a module id
///
/// Returns `None` for modules without a production sequence (storage and
/// transport are driven differently).
#[must_use]
pub fn sequence_for(module_id: &str) -> Option<&'static [SequenceStep]> {
    const DRILL: &[SequenceStep] = &[
        step("PICK", "input"),
        step("DRILL", "build"),
        step("DROP", "output"),
    ];
    const MILL: &[SequenceStep] = &[
        step("PICK", "input"),
        step("MILL", "build"),
        step("DROP", "output"),
    ];
    const AIQS: &[SequenceStep] = &[
        step("PICK", "input"),
        step("CHECK_QUALITY", "search"),
        step("DROP", "output"),
    ];

    match module_id {
        "DRILL" => Some(DRILL),
        "MILL" => Some(MILL),
        "AIQS" => Some(AIQS),
        _ => None,
    }
}

/// Command names of a module's sequence, for workflow planning
#[must_use]
pub fn planned_commands(module_id: &str) -> Option<Vec<String>> {
    sequence_for(module_id).map(|steps| steps.iter().map(|s| s.name.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_modules_have_three_steps() {
        for module in ["DRILL", "MILL", "AIQS"] {
            let steps = sequence_for(module).unwrap();
            assert_eq!(steps.len(), 3);
            assert_eq!(steps[0].name, "PICK");
            assert_eq!(steps[2].name, "DROP");
        }
    }

    #[test]
    fn storage_modules_have_no_sequence() {
        assert!(sequence_for("HBW").is_none());
        assert!(sequence_for("DPS").is_none());
    }

    #[test]
    fn planned_commands_match_steps() {
        assert_eq!(
            planned_commands("DRILL").unwrap(),
            vec!["PICK", "DRILL", "DROP"]
        );
    }
}
