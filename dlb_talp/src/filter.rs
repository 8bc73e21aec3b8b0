//! Region-selection filter grammar: `[include|exclude]:name1,name2,...|all`
//!.

/// Parsed region-selection filter. Parsed once per process at
/// [`crate::store::RegionStore`] construction and consulted on every
/// region registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionFilter {
    /// No filter configured; every region is enabled.
    AllowAll,
    /// Only the named regions are enabled; the rest register disabled.
    Include(Vec<String>),
    /// The named regions register disabled; everything else is enabled.
    Exclude(Vec<String>),
}

impl Default for RegionFilter {
    fn default() -> Self {
        RegionFilter::AllowAll
    }
}

impl RegionFilter {
    /// Parse a `talp-region-select` spec. An empty string or `"all"`
    /// (case-insensitive) is [`RegionFilter::AllowAll`]. Unrecognised
    /// prefixes default to allow-all rather than rejecting the region
    /// outright, matching the original's permissive flag-parsing.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec.eq_ignore_ascii_case("all") {
            return RegionFilter::AllowAll;
        }

        let Some((kind, names)) = spec.split_once(':') else {
            return RegionFilter::AllowAll;
        };
        let names: Vec<String> = names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        match kind.trim().to_ascii_lowercase().as_str() {
            "include" => RegionFilter::Include(names),
            "exclude" => RegionFilter::Exclude(names),
            _ => RegionFilter::AllowAll,
        }
    }

    /// `true` if `name` should register enabled under this filter. The
    /// distinguished global region is always enabled, regardless of
    /// filter, since it is required for process-wide accounting.
    pub fn is_enabled(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case("global") {
            return true;
        }
        match self {
            RegionFilter::AllowAll => true,
            RegionFilter::Include(names) => names.iter().any(|n| n == name),
            RegionFilter::Exclude(names) => !names.iter().any(|n| n == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_allows_everything() {
        assert_eq!(RegionFilter::parse(""), RegionFilter::AllowAll);
        assert!(RegionFilter::parse("").is_enabled("anything"));
    }

    #[test]
    fn all_keyword_allows_everything() {
        assert_eq!(RegionFilter::parse("ALL"), RegionFilter::AllowAll);
    }

    #[test]
    fn include_enables_only_listed_names() {
        let filter = RegionFilter::parse("include:Foo,Bar");
        assert!(filter.is_enabled("Foo"));
        assert!(filter.is_enabled("Bar"));
        assert!(!filter.is_enabled("Baz"));
    }

    #[test]
    fn exclude_disables_only_listed_names() {
        let filter = RegionFilter::parse("exclude:Private");
        assert!(!filter.is_enabled("Private"));
        assert!(filter.is_enabled("Public"));
    }

    #[test]
    fn global_region_is_always_enabled() {
        let filter = RegionFilter::parse("exclude:Global");
        assert!(filter.is_enabled("Global"));
        assert!(filter.is_enabled("global"));
    }

    #[test]
    fn unrecognised_prefix_falls_back_to_allow_all() {
        assert_eq!(RegionFilter::parse("bogus:Foo"), RegionFilter::AllowAll);
    }
}
