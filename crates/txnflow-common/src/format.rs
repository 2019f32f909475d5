//! String normalisation for source codes

/// Left-pad a purely numeric code with zeros to four digits.
///
/// Store numbers, department, class and fee codes are four-digit codes
/// downstream. Values that are empty, non-numeric or already four digits or
/// longer come back unchanged.
///
/// ```
/// use txnflow_common::format::to_four_digit;
///
/// assert_eq!(to_four_digit("12"), "0012");
/// assert_eq!(to_four_digit("12345"), "12345");
/// assert_eq!(to_four_digit("A12"), "A12");
/// ```
pub fn to_four_digit(input: &str) -> String {
    if !is_numeric(input) || input.len() >= 4 {
        return input.to_string();
    }
    format!("{:0>4}", input)
}

fn is_numeric(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pads_short_numeric_codes() {
        assert_eq!(to_four_digit("1"), "0001");
        assert_eq!(to_four_digit("123"), "0123");
        assert_eq!(to_four_digit("0123"), "0123");
    }

    #[test]
    fn test_leaves_other_values_alone() {
        assert_eq!(to_four_digit(""), "");
        assert_eq!(to_four_digit("ABC"), "ABC");
        assert_eq!(to_four_digit("12 "), "12 ");
        assert_eq!(to_four_digit("-12"), "-12");
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("0042"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("42AB"));
    }

    proptest! {
        #[test]
        fn short_numeric_codes_become_four_digits(code in "[0-9]{1,3}") {
            let padded = to_four_digit(&code);
            prop_assert_eq!(padded.len(), 4);
            prop_assert!(is_numeric(&padded));
            prop_assert!(padded.ends_with(&code));
        }

        #[test]
        fn long_codes_are_unchanged(code in "[0-9]{4,10}") {
            prop_assert_eq!(to_four_digit(&code), code);
        }
    }
}
