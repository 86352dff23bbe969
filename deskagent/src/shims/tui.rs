//! Terminal chat deliverer: prints assistant replies straight to stdout.

use deskagent_agent::ports::TuiDeliverer;

pub struct StdoutTuiDeliverer;

impl TuiDeliverer for StdoutTuiDeliverer {
    fn deliver(&self, content: &str, attachments: &[String]) {
        println!("{content}");
        for path in attachments {
            println!("  [attachment: {path}]");
        }
    }
}
