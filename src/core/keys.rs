use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::command::Executable;
use crate::core::runner::run_sync;

const FINGERPRINT_MARKER: &str = "Fingerprint";

static RE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^:]+?)\s*(\([^)]*\))?:\s*(\S.*?)\s*$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChiaKey {
    pub fingerprint: String,
    pub master_public_key: String,
    pub farmer_public_key: String,
    pub pool_public_key: String,
    pub first_wallet_address: String,
}

impl ChiaKey {
    fn apply_line(&mut self, line: &str) {
        let Some(cap) = RE_FIELD.captures(line) else {
            return;
        };
        let (Some(label), Some(value)) = (cap.get(1), cap.get(3)) else {
            return;
        };
        let value = value.as_str().to_string();
        match label.as_str() {
            FINGERPRINT_MARKER => self.fingerprint = value,
            "Master public key" => self.master_public_key = value,
            "Farmer public key" => self.farmer_public_key = value,
            "Pool public key" => self.pool_public_key = value,
            "First wallet address" => self.first_wallet_address = value,
            _ => {}
        }
    }
}

/// Groups `keys show` output into records. Each line containing the
/// fingerprint marker opens a new record; following lines fill it in.
pub fn parse_keys<S: AsRef<str>>(lines: &[S]) -> Vec<ChiaKey> {
    let mut keys: Vec<ChiaKey> = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if line.contains(FINGERPRINT_MARKER) {
            keys.push(ChiaKey::default());
        }
        if let Some(current) = keys.last_mut() {
            current.apply_line(line);
        }
    }
    keys
}

pub fn read_keys(executable: &Executable, timeout: Duration) -> Vec<ChiaKey> {
    parse_keys(&run_sync(executable, &["keys", "show"], timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Showing all public keys derived from your private keys:

Fingerprint: 2104826454
Master public key (m): 8a2d0f3e
Farmer public key (m/12381/8444/0/0): 97a1c0ff
Pool public key (m/12381/8444/1/0): 8d1e7720
First wallet address: xch1qqqqqqqq

Fingerprint: 3911017321
Master public key (m): b00b1e55
Farmer public key (m/12381/8444/0/0): 0faded00
Pool public key (m/12381/8444/1/0): c0ffee11
";

    #[test]
    fn parses_each_fingerprint_block() {
        let lines: Vec<&str> = OUTPUT.lines().collect();
        let keys = parse_keys(&lines);

        assert_eq!(keys.len(), 2);
        assert_eq!(
            keys[0],
            ChiaKey {
                fingerprint: "2104826454".into(),
                master_public_key: "8a2d0f3e".into(),
                farmer_public_key: "97a1c0ff".into(),
                pool_public_key: "8d1e7720".into(),
                first_wallet_address: "xch1qqqqqqqq".into(),
            }
        );
        assert_eq!(keys[1].fingerprint, "3911017321");
        assert_eq!(keys[1].pool_public_key, "c0ffee11");
        assert!(keys[1].first_wallet_address.is_empty());
    }

    #[test]
    fn lines_before_first_marker_are_ignored() {
        let keys = parse_keys(&["Master public key (m): 8a2d0f3e", "No keys are present"]);
        assert!(keys.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn reads_keys_from_executable() {
        let exe = Executable {
            program: "sh".into(),
            prefix_args: vec![
                "-c".into(),
                "[ \"$1 $2\" = 'keys show' ] && printf 'Fingerprint: 42\\nPool public key (m/1/2): abc\\n'".into(),
                "chia".into(),
            ],
        };
        let keys = read_keys(&exe, Duration::from_secs(10));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fingerprint, "42");
        assert_eq!(keys[0].pool_public_key, "abc");
    }
}
