//! # Name Resolution Module
//!
//! Centralizza il calcolo dei nomi dei file di output.
//!
//! ## Algoritmo:
//! 1. Rimuove l'estensione originale (testo dopo l'ultimo `.`)
//! 2. Lower-case
//! 3. Ogni run di caratteri fuori da `[a-z0-9]` diventa un singolo `-`
//! 4. Trim dei `-` iniziali/finali
//! 5. Base vuota → `file`
//! 6. Aggiunge `.` + estensione target
//!
//! Deterministico e totale: non fallisce mai. Non garantisce unicità nel batch
//! (due nomi che normalizzano uguale collidono, vedi `archive`).

/// Base name used when nothing survives normalization.
pub const FALLBACK_BASE: &str = "file";

/// Utility per calcolare i nomi di output in modo centralizzato
pub struct NameResolver;

impl NameResolver {
    /// Strips the extension (text after the last `.`) from a file name.
    pub fn strip_extension(file_name: &str) -> &str {
        match file_name.rfind('.') {
            Some(index) => &file_name[..index],
            None => file_name,
        }
    }

    /// Normalized, filesystem-safe base name (no extension).
    pub fn base_name(file_name: &str) -> String {
        let stem = Self::strip_extension(file_name).to_lowercase();

        let mut base = String::with_capacity(stem.len());
        let mut pending_hyphen = false;
        for c in stem.chars() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                // Il trattino va emesso solo tra due segmenti validi
                if pending_hyphen && !base.is_empty() {
                    base.push('-');
                }
                pending_hyphen = false;
                base.push(c);
            } else {
                pending_hyphen = true;
            }
        }

        if base.is_empty() {
            FALLBACK_BASE.to_string()
        } else {
            base
        }
    }

    /// `<normalized-base>.<extension>`
    pub fn resolve(file_name: &str, extension: &str) -> String {
        format!("{}.{}", Self::base_name(file_name), extension)
    }

    /// `<normalized-base>-<suffix>.<extension>`
    pub fn resolve_with_suffix(file_name: &str, suffix: &str, extension: &str) -> String {
        format!("{}-{}.{}", Self::base_name(file_name), suffix, extension)
    }
}
