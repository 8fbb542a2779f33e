//! Parsing of whole filter-list bodies.

use itertools::{Either, Itertools};

use crate::filters::{Filter, FilterRef, FilterType};

/// Checks whether a line is a list header like `[Adblock Plus 2.0]`
/// rather than a rule.
fn is_list_header(line: &str) -> bool {
    line.starts_with("[Adblock")
}

/// Parses every line of `list` and splits the active rules into network
/// filters and element-hiding filters, ready to feed the request matcher
/// and the element-hiding indices. Blank lines, headers, comments and
/// invalid rules are dropped.
pub fn parse_filter_list(list: &str) -> (Vec<FilterRef>, Vec<FilterRef>) {
    list.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || is_list_header(line) {
                return None;
            }
            Filter::from_text(line)
        })
        .filter(|filter| filter.filter_type().contains(FilterType::ACTIVE))
        .partition_map(|filter| {
            if filter.filter_type().contains(FilterType::ELEM_HIDE_BASE) {
                Either::Right(filter)
            } else {
                Either::Left(filter)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_bodies_are_split_by_kind() {
        let list = "[Adblock Plus 2.0]\n\
                    ! Title: test list\n\
                    ||ads.example.com^\n\
                    \n\
                    @@||cdn.example.com^$script\n\
                    example.com##.banner\n\
                    example.com#@#.banner\n\
                    bogus$rule-option\n";
        let (network, elem_hide) = parse_filter_list(list);
        assert_eq!(network.len(), 2);
        assert_eq!(elem_hide.len(), 2);
        assert_eq!(network[0].text(), "||ads.example.com^");
        assert_eq!(elem_hide[0].text(), "example.com##.banner");
        assert_eq!(elem_hide[1].text(), "example.com#@#.banner");
    }

    #[test]
    fn comments_and_invalid_rules_are_dropped() {
        let (network, elem_hide) = parse_filter_list("! only a comment\nads$nonsense\n");
        assert!(network.is_empty());
        assert!(elem_hide.is_empty());
    }
}
