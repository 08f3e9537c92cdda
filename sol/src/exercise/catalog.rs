//! Exercise flow catalog
//!
//! The fixed set of guided exercise definitions. Lookup goes through
//! category normalization so every descriptor variant a caller produces
//! ("Box Breathing", "deep_breathing", "breath") resolves to one canonical
//! definition.

use std::sync::OnceLock;
use tracing::debug;

/// One step of a guided exercise
#[derive(Debug, Clone)]
pub struct FlowStep {
    /// Display title ("Arriving")
    pub title: &'static str,

    /// Therapeutic goal stated to the completion service
    pub goal: &'static str,

    /// Instructions for the first turn of the step
    pub initial_instructions: &'static str,

    /// Instructions for deepening turns while the step repeats
    pub deepening_instructions: &'static str,
}

/// An immutable, named, ordered sequence of exercise steps
#[derive(Debug, Clone)]
pub struct ExerciseFlowDefinition {
    /// Display name ("Calming breath")
    pub name: &'static str,

    /// Canonical category slug ("breathing")
    pub category: &'static str,

    /// Ordered steps
    pub steps: Vec<FlowStep>,

    /// Whether completion requests a structured recap before the mood gate
    pub recap: bool,
}

impl ExerciseFlowDefinition {
    /// Number of steps in the flow
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step at `index`, clamped to the last step
    ///
    /// The advancement signal is unverified, so out-of-range indexes are
    /// clamped rather than trusted.
    pub fn step(&self, index: usize) -> &FlowStep {
        let clamped = index.min(self.steps.len() - 1);
        &self.steps[clamped]
    }
}

/// Normalize a free-form descriptor to a category slug
///
/// Lowercases, trims, and collapses separators so "Box Breathing",
/// "box_breathing" and "box-breathing" all compare equal.
pub fn normalize_category(descriptor: &str) -> String {
    debug!(%descriptor, "normalize_category: called");
    let mut slug = String::with_capacity(descriptor.len());
    let mut last_dash = true;
    for c in descriptor.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Resolve a descriptor to its canonical flow definition
///
/// Returns `None` for unknown descriptors; callers fail closed.
pub fn resolve(descriptor: &str) -> Option<&'static ExerciseFlowDefinition> {
    let slug = normalize_category(descriptor);
    debug!(%descriptor, %slug, "resolve: called");

    let canonical = match slug.as_str() {
        "body-scan" | "bodyscan" | "body" => "body-scan",
        "gratitude" | "gratitude-practice" | "three-good-things" => "gratitude",
        "grounding" | "five-senses" | "5-4-3-2-1" | "54321" => "grounding",
        "vision-of-future" | "vision" | "future-self" | "future-vision" => "vision-of-future",
        "therapy-goal" | "therapy-goal-definition" | "goal" | "goal-definition" => "therapy-goal",
        // every breathing variant resolves to the one breathing flow
        other if other.contains("breath") => "breathing",
        _ => return None,
    };

    catalog().iter().find(|flow| flow.category == canonical)
}

/// The fixed exercise catalog
pub fn catalog() -> &'static [ExerciseFlowDefinition] {
    static CATALOG: OnceLock<Vec<ExerciseFlowDefinition>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

fn build_catalog() -> Vec<ExerciseFlowDefinition> {
    vec![
        ExerciseFlowDefinition {
            name: "Calming breath",
            category: "breathing",
            recap: false,
            steps: vec![
                FlowStep {
                    title: "Arriving",
                    goal: "Help the person settle and notice their starting state",
                    initial_instructions: "Invite the person to sit comfortably and take one slow breath, \
                        then ask what they notice in their body right now.",
                    deepening_instructions: "Stay with what the person noticed; ask where in the body the \
                        sensation is strongest.",
                },
                FlowStep {
                    title: "Slowing the exhale",
                    goal: "Lengthen the exhale to activate the relaxation response",
                    initial_instructions: "Guide a breath with a four-count inhale and a six-count exhale, \
                        then ask how the longer exhale felt.",
                    deepening_instructions: "Encourage two or three more rounds; ask what changes between \
                        the first and the last round.",
                },
                FlowStep {
                    title: "Riding the rhythm",
                    goal: "Sustain the slow rhythm long enough for the body to follow",
                    initial_instructions: "Invite a full minute of the same rhythm, counting silently, then \
                        ask what thoughts pulled at their attention.",
                    deepening_instructions: "Normalize wandering attention; ask the person to describe \
                        returning to the count once more.",
                },
                FlowStep {
                    title: "Carrying it out",
                    goal: "Anchor the practice to a moment in daily life",
                    initial_instructions: "Ask when, in an ordinary day, one slow exhale would help the most.",
                    deepening_instructions: "Help the person make the moment concrete: where they are, what \
                        cues them, what they do next.",
                },
            ],
        },
        ExerciseFlowDefinition {
            name: "Body scan",
            category: "body-scan",
            recap: false,
            steps: vec![
                FlowStep {
                    title: "Head and shoulders",
                    goal: "Notice held tension in the upper body without changing it",
                    initial_instructions: "Invite attention to forehead, jaw and shoulders; ask what the \
                        person finds there.",
                    deepening_instructions: "Ask what happens to the tension when it is simply watched for \
                        a few breaths.",
                },
                FlowStep {
                    title: "Chest and belly",
                    goal: "Connect breath movement with emotional state",
                    initial_instructions: "Guide attention to the rise and fall of chest and belly; ask what \
                        mood lives there right now.",
                    deepening_instructions: "Ask the person to describe the mood's texture - heavy, tight, \
                        fluttering - in their own words.",
                },
                FlowStep {
                    title: "Whole body",
                    goal: "Integrate the scan into one felt sense of the present",
                    initial_instructions: "Invite one breath that sweeps from head to feet; ask what one word \
                        describes the body now.",
                    deepening_instructions: "Compare the word with how the person arrived; ask what shifted.",
                },
            ],
        },
        ExerciseFlowDefinition {
            name: "Gratitude practice",
            category: "gratitude",
            recap: false,
            steps: vec![
                FlowStep {
                    title: "Finding one good thing",
                    goal: "Surface one concrete positive moment from the day",
                    initial_instructions: "Ask for one small thing from today the person is glad happened, \
                        however minor.",
                    deepening_instructions: "Ask for the details: where they were, who was there, what made \
                        it land.",
                },
                FlowStep {
                    title: "Feeling it again",
                    goal: "Re-experience the moment rather than just report it",
                    initial_instructions: "Invite the person to replay the moment and name what they feel in \
                        the body while doing so.",
                    deepening_instructions: "Slow the replay down; ask which instant of it they would keep.",
                },
                FlowStep {
                    title: "Widening the circle",
                    goal: "Generalize from the moment to a source of good in their life",
                    initial_instructions: "Ask what the moment says about what - or who - reliably brings \
                        them good.",
                    deepening_instructions: "Ask how they might meet that source on purpose this week.",
                },
            ],
        },
        ExerciseFlowDefinition {
            name: "Grounding with the senses",
            category: "grounding",
            recap: false,
            steps: vec![
                FlowStep {
                    title: "What you can see and touch",
                    goal: "Interrupt rumination by loading the senses",
                    initial_instructions: "Ask the person to name things they can see around them right now, \
                        and one thing they can feel against their skin.",
                    deepening_instructions: "Ask for finer detail on one item - color, edge, temperature.",
                },
                FlowStep {
                    title: "What you can hear",
                    goal: "Extend sensory attention to the background",
                    initial_instructions: "Ask for the sounds in the room, near and far.",
                    deepening_instructions: "Ask which sound is steadiest and invite listening to it for a \
                        few breaths.",
                },
                FlowStep {
                    title: "Back in the room",
                    goal: "Check the effect of grounding on the initial distress",
                    initial_instructions: "Ask how present the person feels now compared to when they began.",
                    deepening_instructions: "Ask what of the exercise they could reach for next time the \
                        spiral starts.",
                },
            ],
        },
        ExerciseFlowDefinition {
            name: "Vision of the future",
            category: "vision-of-future",
            recap: true,
            steps: vec![
                FlowStep {
                    title: "A good ordinary day",
                    goal: "Elicit a concrete picture of a desired future, not an abstract wish",
                    initial_instructions: "Ask the person to describe an ordinary day, two years from now, \
                        that they would be glad to wake up into.",
                    deepening_instructions: "Pull the picture into focus: ask about one scene of that day in \
                        sensory detail.",
                },
                FlowStep {
                    title: "Who and what is around",
                    goal: "Surface the relationships and values inside the vision",
                    initial_instructions: "Ask who shows up in that day, and what the person has let go of \
                        to make room.",
                    deepening_instructions: "Ask which of those presences already exists today, even faintly.",
                },
                FlowStep {
                    title: "The first visible step",
                    goal: "Link the vision to a near-term observable change",
                    initial_instructions: "Ask what the earliest visible sign would be that life is bending \
                        toward that day.",
                    deepening_instructions: "Ask what the person could do this month that someone else could \
                        notice.",
                },
            ],
        },
        ExerciseFlowDefinition {
            name: "Defining a therapy goal",
            category: "therapy-goal",
            recap: true,
            steps: vec![
                FlowStep {
                    title: "Naming the change",
                    goal: "Move from a complaint to a desired change stated positively",
                    initial_instructions: "Ask what the person wants more of in their life - not what they \
                        want to stop.",
                    deepening_instructions: "Help rephrase any 'less of X' answer into the presence it would \
                        leave behind.",
                },
                FlowStep {
                    title: "Making it observable",
                    goal: "Define what the change looks like from the outside",
                    initial_instructions: "Ask how a close friend would notice the change without being told.",
                    deepening_instructions: "Ask for one concrete situation where the change would show first.",
                },
                FlowStep {
                    title: "Sizing the first step",
                    goal: "Agree on a step small enough to happen this week",
                    initial_instructions: "Ask what ten-minute version of the change could happen in the next \
                        seven days.",
                    deepening_instructions: "Shrink the step until the person says it sounds almost too easy.",
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Box Breathing"), "box-breathing");
        assert_eq!(normalize_category("box_breathing"), "box-breathing");
        assert_eq!(normalize_category("  Vision of Future "), "vision-of-future");
        assert_eq!(normalize_category("5-4-3-2-1"), "5-4-3-2-1");
    }

    #[test]
    fn test_breathing_variants_resolve_to_one_flow() {
        let a = resolve("breathing").unwrap();
        let b = resolve("Box Breathing").unwrap();
        let c = resolve("deep_breathing").unwrap();
        let d = resolve("breath").unwrap();
        assert_eq!(a.category, "breathing");
        assert_eq!(b.category, a.category);
        assert_eq!(c.category, a.category);
        assert_eq!(d.category, a.category);
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        assert!(resolve("juggling").is_none());
        assert!(resolve("").is_none());
    }

    #[test]
    fn test_recap_flags() {
        assert!(resolve("vision of future").unwrap().recap);
        assert!(resolve("therapy goal definition").unwrap().recap);
        assert!(!resolve("breathing").unwrap().recap);
        assert!(!resolve("gratitude").unwrap().recap);
    }

    #[test]
    fn test_step_clamps_out_of_range() {
        let flow = resolve("body-scan").unwrap();
        let last = flow.step(flow.step_count() - 1);
        let clamped = flow.step(99);
        assert_eq!(last.title, clamped.title);
    }

    #[test]
    fn test_catalog_flows_have_steps() {
        for flow in catalog() {
            assert!(!flow.steps.is_empty(), "flow {} has no steps", flow.name);
        }
    }
}
