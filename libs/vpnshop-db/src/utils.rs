use rand::Rng;

const PUBLIC_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const PUBLIC_CODE_LEN: usize = 9;

const LETTERS: usize = 26;

/// Short shareable code shown to users and accepted as a referral token.
/// Always starts with a letter so it never reads as a numeric user id.
pub fn generate_public_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(PUBLIC_CODE_LEN);
    code.push(PUBLIC_CODE_ALPHABET[rng.random_range(0..LETTERS)] as char);
    for _ in 1..PUBLIC_CODE_LEN {
        code.push(PUBLIC_CODE_ALPHABET[rng.random_range(0..PUBLIC_CODE_ALPHABET.len())] as char);
    }
    code
}

pub fn is_public_code(candidate: &str) -> bool {
    candidate.len() == PUBLIC_CODE_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
