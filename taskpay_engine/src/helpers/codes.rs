use rand::Rng;

use crate::traits::EscrowError;

/// How many draws we attempt before giving up. With a six digit space and a handful of pending codes the loop
/// effectively never iterates more than once.
const MAX_ATTEMPTS: usize = 100;

/// Draws a fresh numeric confirmation code of `digits` decimal digits (no leading zero, so six digits gives
/// 900,000 possible values). The global used-code registry enforces uniqueness at consumption time; rejecting
/// collisions against the currently pending codes here keeps two in-flight orders from ever sharing a code.
pub fn new_confirmation_code<R: Rng>(
    rng: &mut R,
    digits: u32,
    pending: &[String],
) -> Result<String, EscrowError> {
    let digits = digits.clamp(4, 9);
    let lower = 10u64.pow(digits - 1);
    let upper = 10u64.pow(digits);
    for _ in 0..MAX_ATTEMPTS {
        let code = rng.gen_range(lower..upper).to_string();
        if !pending.iter().any(|p| p == &code) {
            return Ok(code);
        }
    }
    Err(EscrowError::CodeSpaceExhausted)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_have_requested_length() {
        let mut rng = rand::thread_rng();
        for digits in [4, 6, 8] {
            let code = new_confirmation_code(&mut rng, digits, &[]).unwrap();
            assert_eq!(code.len(), digits as usize);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.chars().next(), Some('0'));
        }
    }

    #[test]
    fn exhausted_space_is_an_error() {
        // Every four digit code is pending, so no draw can succeed.
        let pending = (1000u64..10000).map(|n| n.to_string()).collect::<Vec<_>>();
        let mut rng = rand::thread_rng();
        let result = new_confirmation_code(&mut rng, 4, &pending);
        assert!(matches!(result, Err(EscrowError::CodeSpaceExhausted)));
    }

    #[test]
    fn pending_codes_are_rejected() {
        // Leave a single free value in the four digit space; the generator must find it or give up,
        // never return a pending code.
        let pending = (1000u64..10000).filter(|n| *n != 5555).map(|n| n.to_string()).collect::<Vec<_>>();
        let mut rng = rand::thread_rng();
        if let Ok(code) = new_confirmation_code(&mut rng, 4, &pending) {
            assert_eq!(code, "5555");
        }
    }
}
