//! Malformed and adversarial input must come back as errors, never panics.

use foldex_sexp::{Error, Sexp};
use proptest::prelude::*;

fn sexp() -> Sexp<()> {
    Sexp::new()
}

proptest! {
    #[test]
    fn parse_never_panics(text in ".{0,64}") {
        let _ = sexp().parse(&text);
    }

    #[test]
    fn parse_never_panics_on_sexp_like_input(text in r##"[()"#@tf 0-9a-z<>=+;\-]{0,48}"##) {
        let sexp = sexp();
        if let Ok(term) = sexp.parse(&text) {
            // Whatever parsed must evaluate to a value or a reported error.
            let _ = sexp.eval(&mut (), &term);
        }
    }

    #[test]
    fn unbalanced_input_reports_position(depth in 1usize..20) {
        let text = "(and ".repeat(depth);
        match sexp().parse(&text) {
            Err(Error::Parse { position, .. }) => prop_assert!(position <= text.len()),
            other => prop_assert!(false, "expected parse error, got {:?}", other),
        }
    }
}
