pub mod config;
pub mod tracing;

use ring::constant_time;

/// Compares two tokens/signatures without leaking their contents through
/// timing side-channels. Length mismatches fail without further work.
pub fn constant_time_cmp(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_const_time_cmp() {
        let expects = "session_token";
        let passing = "session_token";

        let bad_start = "__ssion_token";
        let bad_end = "session_tok__";

        let short = "session_toke";
        let long = "session_token_";

        assert!(constant_time_cmp(expects, passing));
        assert!(!constant_time_cmp(expects, bad_start));
        assert!(!constant_time_cmp(expects, bad_end));
        assert!(!constant_time_cmp(expects, short));
        assert!(!constant_time_cmp(expects, long));
    }
}
