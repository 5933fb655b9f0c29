//! Decoy ("canary") documents: the table, the HTML, the dispenser that serves
//! them and the receiver their beacons phone home to.

pub mod callback;
pub mod dispenser;
pub mod documents;
pub mod html;

pub use callback::{CanaryAlert, CanaryEvent, Fingerprint, handle_canary_callback};
pub use dispenser::{CanaryRequest, CanaryToken, generate_canary_token, serve_canary_document};
pub use documents::{CANARY_DOCUMENTS, CanaryDocumentSpec, render_robots_txt};
pub use html::{generate_canary_html, html_escape};
