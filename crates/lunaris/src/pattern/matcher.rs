//! The backtracking match engine.
//!
//! A close transcription of the classic Lua matcher, working on byte
//! slices with index cursors. Errors (malformed patterns, capture
//! overflow, excessive backtracking) surface as strings; the string
//! library turns them into Lua errors.

use crate::limits::{MAX_CAPTURES, MAX_MATCH_DEPTH};

const ESC: u8 = b'%';

/// A finished capture: a byte range of the subject, or a 1-based
/// position for the empty `()` form.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capture {
    Str(usize, usize),
    Pos(usize),
}

/// One successful match: the byte range plus the captures in order.
#[derive(Clone, Debug)]
pub struct PatternMatch {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

#[derive(Clone, Copy)]
enum CapState {
    Unfinished(usize),
    Position(usize),
    Done(usize, usize),
}

struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    caps: Vec<CapState>,
    depth: usize,
}

/// Find the first match of `pat` in `src` at or after byte `init`.
/// A leading `^` anchors the pattern to `init` itself.
pub fn first_match(
    src: &[u8],
    pat: &[u8],
    init: usize,
) -> Result<Option<PatternMatch>, String> {
    let (anchored, pstart) = match pat.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };
    let mut state = MatchState {
        src,
        pat,
        caps: Vec::new(),
        depth: 0,
    };
    let mut s = init.min(src.len());
    loop {
        state.caps.clear();
        state.depth = 0;
        if let Some(end) = state.do_match(s, pstart)? {
            let captures = state
                .caps
                .iter()
                .map(|c| match c {
                    CapState::Done(start, end) => Ok(Capture::Str(*start, *end)),
                    CapState::Position(pos) => Ok(Capture::Pos(pos + 1)),
                    CapState::Unfinished(_) => {
                        Err("unfinished capture".to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(PatternMatch {
                start: s,
                end,
                captures,
            }));
        }
        if anchored || s >= src.len() {
            return Ok(None);
        }
        s += 1;
    }
}

impl<'a> MatchState<'a> {
    fn do_match(&mut self, mut s: usize, mut p: usize) -> Result<Option<usize>, String> {
        self.depth += 1;
        if self.depth > MAX_MATCH_DEPTH {
            return Err("pattern too complex".to_string());
        }
        let result = loop {
            if p >= self.pat.len() {
                break Some(s);
            }
            match self.pat[p] {
                b'(' => {
                    break if self.pat.get(p + 1) == Some(&b')') {
                        self.start_capture(s, p + 2, CapState::Position(s))?
                    } else {
                        self.start_capture(s, p + 1, CapState::Unfinished(s))?
                    };
                }
                b')' => break self.end_capture(s, p + 1)?,
                b'$' if p + 1 == self.pat.len() => {
                    break if s == self.src.len() { Some(s) } else { None };
                }
                ESC if p + 1 < self.pat.len() => match self.pat[p + 1] {
                    b'b' => {
                        match self.match_balance(s, p + 2)? {
                            Some(new_s) => {
                                s = new_s;
                                p += 4;
                                continue;
                            }
                            None => break None,
                        }
                    }
                    b'f' => {
                        p += 2;
                        if self.pat.get(p) != Some(&b'[') {
                            return Err(
                                "missing '[' after '%f' in pattern".to_string()
                            );
                        }
                        let ep = self.class_end(p)?;
                        let prev = if s == 0 { 0 } else { self.src[s - 1] };
                        let cur = if s < self.src.len() { self.src[s] } else { 0 };
                        if !self.match_bracket_class(prev, p, ep - 1)
                            && self.match_bracket_class(cur, p, ep - 1)
                        {
                            p = ep;
                            continue;
                        }
                        break None;
                    }
                    d @ b'0'..=b'9' => {
                        match self.match_capture(s, (d - b'0') as usize)? {
                            Some(new_s) => {
                                s = new_s;
                                p += 2;
                                continue;
                            }
                            None => break None,
                        }
                    }
                    _ => {
                        match self.default_match(s, p)? {
                            Step::Done(r) => break r,
                            Step::Advance(ns, np) => {
                                s = ns;
                                p = np;
                                continue;
                            }
                        }
                    }
                },
                _ => match self.default_match(s, p)? {
                    Step::Done(r) => break r,
                    Step::Advance(ns, np) => {
                        s = ns;
                        p = np;
                        continue;
                    }
                },
            }
        };
        self.depth -= 1;
        Ok(result)
    }

    /// A single pattern item, possibly quantified.
    fn default_match(&mut self, s: usize, p: usize) -> Result<Step, String> {
        let ep = self.class_end(p)?;
        let matched = s < self.src.len() && self.single_match(self.src[s], p, ep);
        match self.pat.get(ep) {
            Some(b'?') => {
                if matched
                    && let Some(r) = self.do_match(s + 1, ep + 1)?
                {
                    return Ok(Step::Done(Some(r)));
                }
                Ok(Step::Advance(s, ep + 1))
            }
            Some(b'+') => Ok(Step::Done(if matched {
                self.max_expand(s + 1, p, ep)?
            } else {
                None
            })),
            Some(b'*') => Ok(Step::Done(self.max_expand(s, p, ep)?)),
            Some(b'-') => Ok(Step::Done(self.min_expand(s, p, ep)?)),
            _ => {
                if matched {
                    Ok(Step::Advance(s + 1, ep))
                } else {
                    Ok(Step::Done(None))
                }
            }
        }
    }

    /// Greedy repetition: consume as much as possible, then back off.
    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, String> {
        let mut i = 0;
        while s + i < self.src.len() && self.single_match(self.src[s + i], p, ep) {
            i += 1;
        }
        loop {
            if let Some(r) = self.do_match(s + i, ep + 1)? {
                return Ok(Some(r));
            }
            if i == 0 {
                return Ok(None);
            }
            i -= 1;
        }
    }

    /// Lazy repetition: try the continuation first, grow on failure.
    fn min_expand(
        &mut self,
        mut s: usize,
        p: usize,
        ep: usize,
    ) -> Result<Option<usize>, String> {
        loop {
            if let Some(r) = self.do_match(s, ep + 1)? {
                return Ok(Some(r));
            }
            if s < self.src.len() && self.single_match(self.src[s], p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(
        &mut self,
        s: usize,
        p: usize,
        what: CapState,
    ) -> Result<Option<usize>, String> {
        if self.caps.len() >= MAX_CAPTURES {
            return Err("too many captures".to_string());
        }
        self.caps.push(what);
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps.pop();
        }
        Ok(r)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, String> {
        let idx = self
            .caps
            .iter()
            .rposition(|c| matches!(c, CapState::Unfinished(_)))
            .ok_or_else(|| "invalid pattern capture".to_string())?;
        let CapState::Unfinished(start) = self.caps[idx] else {
            unreachable!()
        };
        self.caps[idx] = CapState::Done(start, s);
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps[idx] = CapState::Unfinished(start);
        }
        Ok(r)
    }

    /// `%1`–`%9`: match the text of an earlier capture again.
    fn match_capture(&mut self, s: usize, l: usize) -> Result<Option<usize>, String> {
        if l == 0 || l > self.caps.len() {
            return Err(format!("invalid capture index %{}", l));
        }
        let (start, end) = match self.caps[l - 1] {
            CapState::Done(a, b) => (a, b),
            _ => return Err(format!("invalid capture index %{}", l)),
        };
        let len = end - start;
        if self.src.len() - s >= len && self.src[start..end] == self.src[s..s + len] {
            Ok(Some(s + len))
        } else {
            Ok(None)
        }
    }

    /// `%bxy`: a balanced run opening with `x` and closing with `y`.
    fn match_balance(&mut self, s: usize, p: usize) -> Result<Option<usize>, String> {
        if p + 1 >= self.pat.len() {
            return Err("malformed pattern (missing arguments to '%b')".to_string());
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        if s >= self.src.len() || self.src[s] != open {
            return Ok(None);
        }
        let mut depth = 1;
        let mut i = s + 1;
        while i < self.src.len() {
            if self.src[i] == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            } else if self.src[i] == open {
                depth += 1;
            }
            i += 1;
        }
        Ok(None)
    }

    /// Index just past a single pattern item starting at `p`.
    fn class_end(&self, p: usize) -> Result<usize, String> {
        let mut p = p;
        match self.pat[p] {
            ESC => {
                if p + 1 >= self.pat.len() {
                    return Err("malformed pattern (ends with '%')".to_string());
                }
                Ok(p + 2)
            }
            b'[' => {
                p += 1;
                if self.pat.get(p) == Some(&b'^') {
                    p += 1;
                }
                // The first character of a set is literal, even ']'.
                loop {
                    if p >= self.pat.len() {
                        return Err("malformed pattern (missing ']')".to_string());
                    }
                    let c = self.pat[p];
                    p += 1;
                    if c == ESC {
                        if p >= self.pat.len() {
                            return Err("malformed pattern (missing ']')".to_string());
                        }
                        p += 1;
                    }
                    if self.pat.get(p) == Some(&b']') {
                        return Ok(p + 1);
                    }
                }
            }
            _ => Ok(p + 1),
        }
    }

    fn single_match(&self, c: u8, p: usize, ep: usize) -> bool {
        match self.pat[p] {
            b'.' => true,
            ESC => match_class(c, self.pat[p + 1]),
            b'[' => self.match_bracket_class(c, p, ep - 1),
            pc => pc == c,
        }
    }

    /// `[...]` set membership; `p` is at `[`, `ec` at the closing `]`.
    fn match_bracket_class(&self, c: u8, mut p: usize, ec: usize) -> bool {
        let mut sig = true;
        if self.pat.get(p + 1) == Some(&b'^') {
            sig = false;
            p += 1;
        }
        p += 1;
        while p < ec {
            if self.pat[p] == ESC {
                p += 1;
                if match_class(c, self.pat[p]) {
                    return sig;
                }
            } else if self.pat.get(p + 1) == Some(&b'-') && p + 2 < ec {
                if self.pat[p] <= c && c <= self.pat[p + 2] {
                    return sig;
                }
                p += 2;
            } else if self.pat[p] == c {
                return sig;
            }
            p += 1;
        }
        !sig
    }
}

enum Step {
    Done(Option<usize>),
    Advance(usize, usize),
}

/// `%a`-style class membership; uppercase letters are complements.
fn match_class(c: u8, cl: u8) -> bool {
    let res = match cl.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => c.is_ascii_whitespace(),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return cl == c,
    };
    if cl.is_ascii_uppercase() { !res } else { res }
}

#[cfg(test)]
mod test {
    use super::*;

    fn find(src: &str, pat: &str) -> Option<(usize, usize, Vec<Capture>)> {
        first_match(src.as_bytes(), pat.as_bytes(), 0)
            .unwrap()
            .map(|m| (m.start + 1, m.end, m.captures))
    }

    #[test]
    fn plain_and_classes() {
        assert_eq!(find("hello", "l+").map(|r| (r.0, r.1)), Some((3, 4)));
        assert_eq!(find("abc123", "%d+").map(|r| (r.0, r.1)), Some((4, 6)));
        assert_eq!(find("abc", "%u"), None);
        assert_eq!(find("aBc", "%u").map(|r| (r.0, r.1)), Some((2, 2)));
    }

    #[test]
    fn anchors() {
        assert_eq!(find("hello", "^h").map(|r| (r.0, r.1)), Some((1, 1)));
        assert_eq!(find("hello", "^e"), None);
        assert_eq!(find("hello", "o$").map(|r| (r.0, r.1)), Some((5, 5)));
        assert_eq!(find("hello", "l$"), None);
        // '$' not at the end is a literal.
        assert_eq!(find("a$b", "a$b").map(|r| (r.0, r.1)), Some((1, 3)));
    }

    #[test]
    fn sets_and_ranges() {
        assert_eq!(find("foo42", "[0-9]+").map(|r| (r.0, r.1)), Some((4, 5)));
        assert_eq!(find("abc", "[^%s]+").map(|r| (r.0, r.1)), Some((1, 3)));
        // First ']' in a set is literal.
        assert_eq!(find("]x", "[]]").map(|r| (r.0, r.1)), Some((1, 1)));
    }

    #[test]
    fn quantifiers() {
        assert_eq!(find("aaa", "a-").map(|r| (r.0, r.1)), Some((1, 0)));
        assert_eq!(find("<b>x</b>", "<(.-)>").map(|r| r.2), Some(vec![
            Capture::Str(1, 2)
        ]));
        assert_eq!(find("ab", "a?b").map(|r| (r.0, r.1)), Some((1, 2)));
        assert_eq!(find("b", "a?b").map(|r| (r.0, r.1)), Some((1, 1)));
    }

    #[test]
    fn captures_and_positions() {
        let (_, _, caps) = find("key=value", "(%w+)=(%w+)").unwrap();
        assert_eq!(caps, vec![Capture::Str(0, 3), Capture::Str(4, 9)]);
        let (_, _, caps) = find("hello", "()ll()").unwrap();
        assert_eq!(caps, vec![Capture::Pos(3), Capture::Pos(5)]);
    }

    #[test]
    fn backrefs() {
        assert_eq!(
            find("abcabc", "(abc)%1").map(|r| (r.0, r.1)),
            Some((1, 6))
        );
        assert_eq!(find("abcabd", "(abc)%1"), None);
    }

    #[test]
    fn balanced() {
        assert_eq!(
            find("(a(b)c)d", "%b()").map(|r| (r.0, r.1)),
            Some((1, 7))
        );
        assert_eq!(find("(unclosed", "%b()"), None);
    }

    #[test]
    fn frontier() {
        // Transition from non-word to word.
        assert_eq!(
            find("THE (quick) fox", "%f[%a]%a+").map(|r| (r.0, r.1)),
            Some((1, 3))
        );
        let m = first_match(b"THE (quick) fox", b"%f[%l]%l+", 0)
            .unwrap()
            .unwrap();
        assert_eq!(&b"THE (quick) fox"[m.start..m.end], b"quick");
    }

    #[test]
    fn malformed() {
        assert!(first_match(b"x", b"%", 0).is_err());
        assert!(first_match(b"x", b"[ab", 0).is_err());
    }
}
