//! Offensive tool fingerprinting
//!
//! Identifies vulnerability scanners and exploitation frameworks by their
//! User-Agent strings. A match is conclusive on its own: legitimate visitors do
//! not announce themselves as `sqlmap`.

use super::RequestSurface;

/// Known offensive tool User-Agent substrings (matched lowercase)
const SCANNER_SIGNATURES: &[&str] = &[
    // Injection and exploitation
    "sqlmap",
    "havij",
    "commix",
    "metasploit",
    "hydra",
    // Network and vulnerability scanners
    "nikto",
    "nmap",
    "masscan",
    "zgrab",
    "nuclei",
    "acunetix",
    "nessus",
    "openvas",
    "netsparker",
    "qualys",
    "w3af",
    "arachni",
    "skipfish",
    "whatweb",
    // Content discovery and fuzzing
    "dirbuster",
    "gobuster",
    "feroxbuster",
    "ffuf",
    "wfuzz",
    "dirb/",
    // CMS scanners
    "wpscan",
    "joomscan",
    "droopescan",
];

/// Name of the offensive tool announced by the request's User-Agent, if any
pub fn detect_scanner(surface: &RequestSurface) -> Option<&'static str> {
    scanner_from_user_agent(surface.user_agent())
}

/// Match a raw User-Agent against the signature list
pub fn scanner_from_user_agent(user_agent: &str) -> Option<&'static str> {
    if user_agent.is_empty() {
        return None;
    }

    let normalized = user_agent.to_ascii_lowercase();
    SCANNER_SIGNATURES
        .iter()
        .find(|signature| normalized.contains(*signature))
        .copied()
}
