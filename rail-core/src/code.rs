use rand::Rng;

pub const BOOKING_CODE_PREFIX: &str = "BK";
pub const BOOKING_CODE_LEN: usize = 8;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of booking codes. Uniqueness is enforced by the store; a collision
/// there makes the caller ask for another code.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> String;
}

/// `BK` followed by eight random characters from `[A-Z0-9]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let body: String = (0..BOOKING_CODE_LEN)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        format!("{}{}", BOOKING_CODE_PREFIX, body)
    }
}

pub fn is_valid_booking_code(code: &str) -> bool {
    match code.strip_prefix(BOOKING_CODE_PREFIX) {
        Some(body) => {
            body.len() == BOOKING_CODE_LEN
                && body.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_are_well_formed() {
        let codes = RandomCodes;
        for _ in 0..500 {
            let code = codes.next_code();
            assert_eq!(code.len(), 10);
            assert!(is_valid_booking_code(&code), "{}", code);
        }
    }

    #[test]
    fn test_codes_rarely_repeat() {
        let codes = RandomCodes;
        let seen: HashSet<String> = (0..1000).map(|_| codes.next_code()).collect();
        assert!(seen.len() > 995);
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_booking_code("BKA1B2C3D4"));
        assert!(!is_valid_booking_code("BKa1b2c3d4"));
        assert!(!is_valid_booking_code("XXA1B2C3D4"));
        assert!(!is_valid_booking_code("BKA1B2"));
    }
}
