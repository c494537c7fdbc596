use std::fmt::Display;

/// Counter a metered product is billed against for overage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageMeter {
    MonthlyResponses,
    MonthlyActivePeople,
}

impl Display for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meter = match self {
            UsageMeter::MonthlyResponses => "monthly_responses",
            UsageMeter::MonthlyActivePeople => "monthly_active_people",
        };
        write!(f, "{}", meter)
    }
}
