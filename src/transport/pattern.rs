use super::*;

/// A fixed, priority-ordered set of prompt patterns.
///
/// [`PatternSet::find`] returns the match that starts earliest in the text;
/// patterns matching at the same position are resolved by declaration order.
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: RegexSet,
    regexes: Vec<Regex>,
    sources: Vec<String>,
}

/// Location of a [`PatternSet`] hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl PatternSet {
    /// Compiles plain string literals; regex metacharacters match themselves.
    pub fn literals<I, S>(literals: I) -> Result<PatternSet, TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::regexes(literals.into_iter().map(|s| regex::escape(s.as_ref())))
    }

    /// Compiles regular expressions.
    pub fn regexes<I, S>(patterns: I) -> Result<PatternSet, TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources: Vec<String> = patterns
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let set = RegexSet::new(&sources)?;
        let regexes = sources
            .iter()
            .map(|s| Regex::new(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            set,
            regexes,
            sources,
        })
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    /// Source text of pattern `index`.
    pub fn source(&self, index: usize) -> Option<&str> {
        self.sources.get(index).map(|s| s.as_str())
    }

    pub fn find(&self, haystack: &str) -> Option<PatternMatch> {
        let mut best: Option<PatternMatch> = None;
        for index in self.set.matches(haystack).iter() {
            let Some(m) = self.regexes[index].find(haystack) else {
                continue;
            };
            if best.is_none_or(|b| m.start() < b.start) {
                best = Some(PatternMatch {
                    index,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_match_wins_over_declaration_order() {
        let set = PatternSet::literals(["login:", "Please login:"]).expect("patterns");
        let found = set.find("Please login: ").expect("match");
        assert_eq!(found.index, 1);
        assert_eq!(found.start, 0);
    }

    #[test]
    fn ties_resolve_by_declaration_order() {
        let set = PatternSet::regexes([r"rkscli:", r"rks\w+:"]).expect("patterns");
        let found = set.find("\r\nrkscli: ").expect("match");
        assert_eq!(found.index, 0);
    }

    #[test]
    fn literals_escape_regex_metacharacters() {
        let set = PatternSet::literals(["(yes/no)?", "a.b"]).expect("patterns");
        assert!(set.find("continue connecting (yes/no)? ").is_some());
        assert!(set.find("axb").is_none());
        assert_eq!(set.source(1), Some(r"a\.b"));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = match PatternSet::regexes(["(unclosed"]) {
            Ok(_) => panic!("bad regex should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, TransportError::InvalidPattern(_)));
    }

    #[test]
    fn empty_set_never_matches() {
        let set = PatternSet::literals(Vec::<String>::new()).expect("empty set");
        assert!(set.is_empty());
        assert!(set.find("anything").is_none());
    }
}
