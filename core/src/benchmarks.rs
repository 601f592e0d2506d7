use serde::Serialize;

/// How a benchmark workout is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BenchmarkKind {
    #[serde(rename = "For Time")]
    ForTime,
    #[serde(rename = "AMRAP")]
    Amrap,
    Other,
}

/// A named benchmark WOD. Scores are logged against `name`.
#[derive(Debug, Clone, Serialize)]
pub struct Benchmark {
    pub name: &'static str,
    pub kind: BenchmarkKind,
    pub description: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'static str>,
}

pub static BENCHMARKS: &[Benchmark] = &[
    Benchmark {
        name: "Fran",
        kind: BenchmarkKind::ForTime,
        description: &["21-15-9 reps of:", "Thrusters (95/65 lb)", "Pull-ups"],
        notes: None,
    },
    Benchmark {
        name: "Cindy",
        kind: BenchmarkKind::Amrap,
        description: &[
            "As Many Rounds As Possible in 20 minutes of:",
            "5 Pull-ups",
            "10 Push-ups",
            "15 Air Squats",
        ],
        notes: None,
    },
    Benchmark {
        name: "Murph",
        kind: BenchmarkKind::ForTime,
        description: &[
            "1 mile Run",
            "100 Pull-ups",
            "200 Push-ups",
            "300 Air Squats",
            "1 mile Run",
        ],
        notes: Some(
            "Partition the pull-ups, push-ups, and squats as needed. \
             If you've got a 20/14 lb weight vest or body armor, wear it.",
        ),
    },
    Benchmark {
        name: "Grace",
        kind: BenchmarkKind::ForTime,
        description: &["30 Clean and Jerks (135/95 lb)"],
        notes: None,
    },
    Benchmark {
        name: "Helen",
        kind: BenchmarkKind::ForTime,
        description: &[
            "3 Rounds of:",
            "400 meter Run",
            "21 Kettlebell Swings (53/35 lb)",
            "12 Pull-ups",
        ],
        notes: None,
    },
    Benchmark {
        name: "Angie",
        kind: BenchmarkKind::ForTime,
        description: &["100 Pull-ups", "100 Push-ups", "100 Sit-ups", "100 Air Squats"],
        notes: Some("Complete all reps of each exercise before moving to the next."),
    },
    Benchmark {
        name: "The Filthy 50",
        kind: BenchmarkKind::ForTime,
        description: &[
            "50 Box jumps (24/20 inch box)",
            "50 Jumping pull-ups",
            "50 Kettlebell swings (35/26 lb)",
            "50 Walking lunge steps",
            "50 Knees-to-elbows",
            "50 Push press (45/35 lb)",
            "50 Back extensions",
            "50 Wall-ball shots (20/14 lb ball)",
            "50 Burpees",
            "50 Double-unders",
        ],
        notes: None,
    },
];

/// Case-insensitive exact lookup by benchmark name.
pub fn find_benchmark(name: &str) -> Option<&'static Benchmark> {
    let wanted = name.trim();
    BENCHMARKS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(wanted))
}
