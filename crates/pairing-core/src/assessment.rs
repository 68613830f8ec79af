//! Assessment instruments and their scoring tables.
//!
//! Seven instruments, each resolving an answer to one or more
//! `(construct, dimension, value)` observations on the 0-10 scale.
//!
//! Routing precedence for an answer:
//! 1. its explicit `kind` tag
//! 2. an exact instrument id (`ASI-12`, `CSI-8`, ...)
//! 3. prefix match on the instrument id, then the question id, in the order
//!    ASI, CSI, ETM, RDS, COG, BIZ, TIME

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::construct::Construct;
use crate::signal::Answer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Asi,
    Csi,
    Etm,
    Rds,
    Cog,
    Biz,
    Time,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 7] = [
        InstrumentKind::Asi,
        InstrumentKind::Csi,
        InstrumentKind::Etm,
        InstrumentKind::Rds,
        InstrumentKind::Cog,
        InstrumentKind::Biz,
        InstrumentKind::Time,
    ];

    pub fn instrument_id(self) -> &'static str {
        match self {
            InstrumentKind::Asi => "ASI-12",
            InstrumentKind::Csi => "CSI-8",
            InstrumentKind::Etm => "ETM-6",
            InstrumentKind::Rds => "RDS-6",
            InstrumentKind::Cog => "COG-8",
            InstrumentKind::Biz => "BIZ-6",
            InstrumentKind::Time => "TIME-6",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            InstrumentKind::Asi => "ASI-",
            InstrumentKind::Csi => "CSI-",
            InstrumentKind::Etm => "ETM-",
            InstrumentKind::Rds => "RDS-",
            InstrumentKind::Cog => "COG-",
            InstrumentKind::Biz => "BIZ-",
            InstrumentKind::Time => "TIME-",
        }
    }

    pub fn construct(self) -> Construct {
        match self {
            InstrumentKind::Asi => Construct::ActionStyle,
            InstrumentKind::Csi => Construct::CommunicationDna,
            InstrumentKind::Etm => Construct::EnergyTopology,
            InstrumentKind::Rds => Construct::RiskDisposition,
            InstrumentKind::Cog => Construct::CognitiveStyle,
            InstrumentKind::Biz => Construct::BusinessReality,
            InstrumentKind::Time => Construct::TemporalPatterns,
        }
    }

    fn by_prefix(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| id.starts_with(k.prefix()))
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.instrument_id())
    }
}

/// Pick the instrument that scores `answer`.
pub fn route(answer: &Answer) -> Option<InstrumentKind> {
    if let Some(kind) = answer.kind {
        return Some(kind);
    }
    let inst = answer.instrument_id.trim();
    InstrumentKind::ALL
        .into_iter()
        .find(|k| k.instrument_id() == inst)
        .or_else(|| InstrumentKind::by_prefix(inst))
        .or_else(|| InstrumentKind::by_prefix(answer.question_id.trim()))
}

/// One observation produced by scoring an answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub construct: Construct,
    pub dimension: &'static str,
    pub value: f64,
}

/// Why an answer produced no observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Unscored {
    UnknownInstrument,
    UnknownQuestion(InstrumentKind),
    UnknownChoice(InstrumentKind),
    WrongValueShape(InstrumentKind),
}

impl fmt::Display for Unscored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unscored::UnknownInstrument => f.write_str("unknown instrument"),
            Unscored::UnknownQuestion(k) => write!(f, "no {k} scoring row for question"),
            Unscored::UnknownChoice(k) => write!(f, "choice not in {k} scoring row"),
            Unscored::WrongValueShape(k) => write!(f, "value has the wrong shape for {k}"),
        }
    }
}

const ASI: [(&str, [(&str, f64); 2]); 12] = [
    ("ASI-01", [("QS", 9.0), ("FF", 8.0)]),
    ("ASI-02", [("QS", 8.0), ("FT", 8.0)]),
    ("ASI-03", [("IM", 9.0), ("FF", 7.0)]),
    ("ASI-04", [("FT", 9.0), ("QS", 7.0)]),
    ("ASI-05", [("FF", 9.0), ("IM", 8.0)]),
    ("ASI-06", [("QS", 8.0), ("IM", 9.0)]),
    ("ASI-07", [("FT", 8.0), ("FF", 9.0)]),
    ("ASI-08", [("IM", 8.0), ("FT", 7.0)]),
    ("ASI-09", [("QS", 9.0), ("FT", 9.0)]),
    ("ASI-10", [("FF", 8.0), ("QS", 8.0)]),
    ("ASI-11", [("IM", 7.0), ("FT", 8.0)]),
    ("ASI-12", [("FF", 7.0), ("IM", 8.0)]),
];

/// Values for choices D, I, S, C; the choice letter is the dimension.
const CSI: [(&str, [f64; 4]); 8] = [
    ("CSI-01", [9.0, 9.0, 8.0, 8.0]),
    ("CSI-02", [8.0, 8.0, 9.0, 9.0]),
    ("CSI-03", [9.0, 7.0, 8.0, 8.0]),
    ("CSI-04", [7.0, 9.0, 7.0, 9.0]),
    ("CSI-05", [8.0, 8.0, 9.0, 7.0]),
    ("CSI-06", [9.0, 7.0, 7.0, 9.0]),
    ("CSI-07", [8.0, 9.0, 8.0, 7.0]),
    ("CSI-08", [7.0, 8.0, 9.0, 8.0]),
];

const DISC: [&str; 4] = ["D", "I", "S", "C"];

const ETM_POSITION_SCORES: [f64; 6] = [10.0, 8.0, 6.0, 4.0, 2.0, 0.0];

const RDS: [(&str, &str); 6] = [
    ("RDS-01", "tolerance"),
    ("RDS-02", "ambiguity"),
    ("RDS-03", "sunk_cost"),
    ("RDS-04", "loss_aversion"),
    ("RDS-05", "speed"),
    ("RDS-06", "bias_to_action"),
];

const COG: [(&str, [(&str, f64); 2]); 8] = [
    ("COG-01", [("holistic", 9.0), ("sequential", 9.0)]),
    ("COG-02", [("abstract", 9.0), ("concrete", 9.0)]),
    ("COG-03", [("holistic", 8.0), ("sequential", 8.0)]),
    ("COG-04", [("abstract", 8.0), ("concrete", 8.0)]),
    ("COG-05", [("holistic", 7.0), ("concrete", 7.0)]),
    ("COG-06", [("sequential", 8.0), ("abstract", 7.0)]),
    ("COG-07", [("holistic", 8.0), ("sequential", 7.0)]),
    ("COG-08", [("concrete", 8.0), ("abstract", 8.0)]),
];

type CodedRow = (&'static str, &'static str, &'static [(&'static str, f64)]);

const BIZ: [CodedRow; 6] = [
    (
        "BIZ-01",
        "focus",
        &[("focus_single", 10.0), ("focus_dual", 6.0), ("focus_multi", 3.0)],
    ),
    (
        "BIZ-02",
        "revenue_maturity",
        &[
            ("rev_pre", 1.0),
            ("rev_early", 4.0),
            ("rev_sustain", 7.0),
            ("rev_growing", 10.0),
        ],
    ),
    (
        "BIZ-03",
        "team_size",
        &[
            ("team_solo", 1.0),
            ("team_contractors", 4.0),
            ("team_small", 7.0),
            ("team_growing", 10.0),
        ],
    ),
    (
        "BIZ-04",
        "bottleneck",
        &[
            ("bottle_ship", 3.0),
            ("bottle_dist", 5.0),
            ("bottle_rev", 7.0),
            ("bottle_ops", 9.0),
        ],
    ),
    (
        "BIZ-05",
        "venture_age",
        &[
            ("age_new", 2.0),
            ("age_early", 4.0),
            ("age_mid", 7.0),
            ("age_mature", 10.0),
        ],
    ),
    (
        "BIZ-06",
        "debt_pressure",
        &[
            ("debt_none", 0.0),
            ("debt_some", 3.0),
            ("debt_heavy", 7.0),
            ("debt_critical", 10.0),
        ],
    ),
];

const TIME: [CodedRow; 6] = [
    (
        "TIME-01",
        "peak_hour",
        &[
            ("peak_early", 2.0),
            ("peak_mid_am", 5.0),
            ("peak_afternoon", 7.0),
            ("peak_evening", 9.0),
        ],
    ),
    (
        "TIME-02",
        "planning_style",
        &[
            ("plan_rigid", 10.0),
            ("plan_flex", 7.0),
            ("plan_reactive", 4.0),
            ("plan_flow", 1.0),
        ],
    ),
    (
        "TIME-03",
        "stall_recovery",
        &[
            ("stall_push", 9.0),
            ("stall_switch", 7.0),
            ("stall_break", 5.0),
            ("stall_ask", 3.0),
        ],
    ),
    (
        "TIME-04",
        "work_intensity",
        &[
            ("hours_part", 3.0),
            ("hours_standard", 5.0),
            ("hours_heavy", 8.0),
            ("hours_max", 10.0),
        ],
    ),
    (
        "TIME-05",
        "context_switch_cost",
        &[
            ("switch_easy", 1.0),
            ("switch_mild", 4.0),
            ("switch_hard", 7.0),
            ("switch_critical", 10.0),
        ],
    ),
    (
        "TIME-06",
        "planning_horizon",
        &[
            ("horizon_short", 2.0),
            ("horizon_mid", 5.0),
            ("horizon_long", 8.0),
            ("horizon_visionary", 10.0),
        ],
    ),
];

fn row<'a, T>(table: &'a [(&str, T)], question: &str) -> Option<&'a T> {
    table
        .iter()
        .find(|(q, _)| q.eq_ignore_ascii_case(question))
        .map(|(_, r)| r)
}

fn ab_index(choice: &str) -> Option<usize> {
    match choice {
        "A" | "a" => Some(0),
        "B" | "b" => Some(1),
        _ => None,
    }
}

fn score_pair(
    kind: InstrumentKind,
    table: &[(&str, [(&'static str, f64); 2])],
    answer: &Answer,
) -> Result<Vec<Score>, Unscored> {
    let pair = row(table, answer.question_id.trim()).ok_or(Unscored::UnknownQuestion(kind))?;
    let choice = answer
        .value
        .as_choice()
        .ok_or(Unscored::WrongValueShape(kind))?;
    let (dimension, value) = ab_index(choice)
        .map(|i| pair[i])
        .ok_or(Unscored::UnknownChoice(kind))?;
    Ok(vec![Score {
        construct: kind.construct(),
        dimension,
        value,
    }])
}

fn score_coded(kind: InstrumentKind, table: &[CodedRow], answer: &Answer) -> Result<Vec<Score>, Unscored> {
    let question = answer.question_id.trim();
    let &(_, dimension, choices) = table
        .iter()
        .find(|(q, _, _)| q.eq_ignore_ascii_case(question))
        .ok_or(Unscored::UnknownQuestion(kind))?;
    let choice = answer
        .value
        .as_choice()
        .ok_or(Unscored::WrongValueShape(kind))?;
    let &(_, value) = choices
        .iter()
        .find(|(code, _)| *code == choice)
        .ok_or(Unscored::UnknownChoice(kind))?;
    Ok(vec![Score {
        construct: kind.construct(),
        dimension,
        value,
    }])
}

/// Score an answer with a specific instrument.
pub fn score_with(kind: InstrumentKind, answer: &Answer) -> Result<Vec<Score>, Unscored> {
    match kind {
        InstrumentKind::Asi => score_pair(kind, &ASI, answer),
        InstrumentKind::Cog => score_pair(kind, &COG, answer),
        InstrumentKind::Csi => {
            let values = row(&CSI, answer.question_id.trim()).ok_or(Unscored::UnknownQuestion(kind))?;
            let choice = answer
                .value
                .as_choice()
                .ok_or(Unscored::WrongValueShape(kind))?;
            let i = DISC
                .iter()
                .position(|d| d.eq_ignore_ascii_case(choice))
                .ok_or(Unscored::UnknownChoice(kind))?;
            Ok(vec![Score {
                construct: kind.construct(),
                dimension: DISC[i],
                value: values[i],
            }])
        }
        InstrumentKind::Etm => {
            let ranking = answer
                .value
                .as_ranking()
                .ok_or(Unscored::WrongValueShape(kind))?;
            let construct = kind.construct();
            Ok(ranking
                .iter()
                .zip(ETM_POSITION_SCORES)
                .filter_map(|(item, value)| {
                    construct
                        .canonical_dimension(item.trim())
                        .map(|dimension| Score {
                            construct,
                            dimension,
                            value,
                        })
                })
                .collect())
        }
        InstrumentKind::Rds => {
            let &dimension =
                row(&RDS, answer.question_id.trim()).ok_or(Unscored::UnknownQuestion(kind))?;
            let v = answer
                .value
                .as_number()
                .ok_or(Unscored::WrongValueShape(kind))?;
            Ok(vec![Score {
                construct: kind.construct(),
                dimension,
                value: (v / 10.0).clamp(0.0, 10.0),
            }])
        }
        InstrumentKind::Biz => score_coded(kind, &BIZ, answer),
        InstrumentKind::Time => score_coded(kind, &TIME, answer),
    }
}

/// Route and score. Returns the instrument alongside its observations.
pub fn score(answer: &Answer) -> Result<(InstrumentKind, Vec<Score>), Unscored> {
    let kind = route(answer).ok_or(Unscored::UnknownInstrument)?;
    score_with(kind, answer).map(|scores| (kind, scores))
}
