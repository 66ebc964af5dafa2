//! Outbound document templates.
//!
//! Base stations are picky about the exact document layout, so outbound
//! documents are rendered from fixed skeletons instead of being serialized
//! from a tree. Placeholders look like `{{name}}` and are substituted in a
//! single pass; substituted values are XML-escaped. Every rendered document
//! ends with the NUL delimiter.

use super::framer::DELIMITER;

const JOB_REQUEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<request version="{{version}}" type="job">
<externalid>{{eid}}</externalid>
<systemdata>
<name>{{system}}</name>
<datetime>{{dt}}</datetime>
<timestamp>{{ts}}</timestamp>
<status>1</status>
<statusinfo>System running</statusinfo>
</systemdata>
<jobdata>
<priority>0</priority>
<messages>
<message1></message1>
<message2></message2>
<messageuui>{{msg}}</messageuui>
</messages>
<status>0</status>
<statusinfo></statusinfo>
</jobdata>
<senderdata>
<address>{{from_ext}}</address>
<name>{{from_name}}</name>
<location>{{from_loc}}</location>
</senderdata>
<persondata>
<address>{{to_ext}}</address>
</persondata>
</request>
"#;

// Sender and recipient are swapped relative to the request being confirmed.
const JOB_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response version="{{version}}" type="job">
<externalid>{{eid}}</externalid>
<systemdata>
<name>{{system}}</name>
<datetime>{{dt}}</datetime>
<timestamp>{{ts}}</timestamp>
<status>1</status>
<statusinfo>System running</statusinfo>
</systemdata>
<jobdata>
<priority>0</priority>
<messages>
<message1></message1>
<message2></message2>
<messageuui></messageuui>
</messages>
<status>1</status>
<statusinfo></statusinfo>
</jobdata>
<senderdata>
<address>{{to_ext}}</address>
<name>name</name>
<location>{{system}}</location>
</senderdata>
<persondata>
<address>{{from_ext}}</address>
<name>{{from_name}}</name>
<location>{{from_loc}}</location>
</persondata>
</response>
"#;

/// Handset identity as carried in `senderdata` / `persondata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub location: String,
}

/// Field set shared by both job templates.
#[derive(Debug, Clone, Copy)]
pub struct JobFields<'a> {
    pub correlation_id: &'a str,
    pub sender: &'a Party,
    pub recipient: &'a str,
    pub datetime: &'a str,
    pub timestamp: &'a str,
    pub message: &'a str,
}

/// Renders outbound documents with the gateway's own identity filled in.
#[derive(Debug, Clone)]
pub struct Templates {
    system_name: String,
    version: String,
}

impl Templates {
    pub fn new(system_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            version: version.into(),
        }
    }

    /// A job request delivering `fields.message` to `fields.recipient`.
    pub fn job_request(&self, fields: &JobFields<'_>) -> String {
        self.render(JOB_REQUEST, fields, fields.message)
    }

    /// An empty acknowledgment for a received job request.
    pub fn job_response(&self, fields: &JobFields<'_>) -> String {
        self.render(JOB_RESPONSE, fields, "")
    }

    fn render(&self, skeleton: &str, f: &JobFields<'_>, message: &str) -> String {
        let mut out = render(skeleton, |key| match key {
            "version" => Some(self.version.as_str()),
            "system" => Some(self.system_name.as_str()),
            "eid" => Some(f.correlation_id),
            "dt" => Some(f.datetime),
            "ts" => Some(f.timestamp),
            "msg" => Some(message),
            "from_ext" => Some(f.sender.address.as_str()),
            "from_name" => Some(f.sender.name.as_str()),
            "from_loc" => Some(f.sender.location.as_str()),
            "to_ext" => Some(f.recipient),
            _ => None,
        });
        out.push(DELIMITER as char);
        out
    }
}

/// Single-pass `{{key}}` substitution. Unknown keys are left verbatim.
fn render<'v>(skeleton: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut out = String::with_capacity(skeleton.len() + 128);
    let mut rest = skeleton;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match lookup(key) {
                    Some(value) => push_escaped(&mut out, value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}
