//! Hash helpers – abstracción para permitir cambiar de algoritmo sin tocar resto del core.

use blake3::Hasher;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash estable de una lista ordenada de textos.
pub fn hash_list<S: AsRef<str>>(items: &[S]) -> String {
    let mut h = Hasher::new();
    for item in items {
        h.update(item.as_ref().as_bytes());
        h.update(b"\n");
    }
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_hash_depends_on_order() {
        let a = hash_list(&["x@mem", "y@mem"]);
        let b = hash_list(&["y@mem", "x@mem"]);
        assert_ne!(a, b);
        assert_eq!(a, hash_list(&["x@mem".to_string(), "y@mem".to_string()]));
        assert_eq!(hash_str("abc").len(), 64);
    }
}
