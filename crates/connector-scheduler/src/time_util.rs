use time::format_description::well_known::Rfc3339;

/// All persisted timestamps are ISO-8601 UTC (SPEC_FULL §6).
pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

pub(crate) fn parse_rfc3339(value: Option<&str>) -> Option<time::OffsetDateTime> {
    value.and_then(|s| time::OffsetDateTime::parse(s, &Rfc3339).ok())
}
