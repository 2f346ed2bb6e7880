//! RFC 3490 conversion of Unicode host names and labels to their ASCII
//! (punycode) form before they go on the wire.

use std::borrow::Cow::{self, Borrowed, Owned};

/// Indicates an error in encoding Punycode data
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Error;

/// Converts a label or host to its ASCII format. If the string is already ASCII,
/// it will be returned unmodified. If an error is encountered in encoding,
/// `Err` will be returned.
pub fn to_ascii(s: &str) -> Result<Cow<str>, Error> {
    if s.is_ascii() {
        Ok(Borrowed(s))
    } else {
        ::idna::domain_to_ascii(s).map(Owned).map_err(|_| Error)
    }
}

#[cfg(test)]
mod test {
    use super::to_ascii;

    static SAMPLE_HOSTS: &[(&str, &str)] = &[
        ("bücher.de.", "xn--bcher-kva.de."),
        ("ουτοπία.δπθ.gr.", "xn--kxae4bafwg.xn--pxaix.gr."),
        // We want to preserve a lack of trailing '.', too.
        ("bücher.de", "xn--bcher-kva.de"),
        ("ουτοπία.δπθ.gr", "xn--kxae4bafwg.xn--pxaix.gr"),
    ];

    #[test]
    fn test_hosts() {
        for &(uni, ascii) in SAMPLE_HOSTS {
            assert_eq!(to_ascii(uni).unwrap(), ascii);

            // Already-ASCII input passes through untouched
            assert_eq!(to_ascii(ascii).unwrap(), ascii);
        }
    }
}
