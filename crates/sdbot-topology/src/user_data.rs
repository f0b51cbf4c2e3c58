//! First-boot user data for the NAT instance.
//!
//! A two-part MIME document: a cloud-config part that makes cloud-init run
//! user scripts on every boot rather than only the first, and a shell part
//! that enables forwarding and masquerades traffic leaving the egress
//! interface.

use std::fmt::Write;

/// MIME boundary used between parts.
pub const BOUNDARY: &str = "//";

/// Interface the isolated subnets' traffic leaves through.
pub const EGRESS_INTERFACE: &str = "eth0";

const CLOUD_CONFIG: &str = "#cloud-config\ncloud_final_modules:\n- [scripts-user, always]\n";

/// Shell commands installed on the NAT instance, in run order.
pub fn nat_commands(interface: &str) -> Vec<String> {
    vec![
        "sysctl -w net.ipv4.ip_forward=1".to_owned(),
        format!("/sbin/iptables -t nat -A POSTROUTING -o {interface} -j MASQUERADE"),
        "yum install -y iptables-services".to_owned(),
        "service iptables save".to_owned(),
    ]
}

pub fn render_user_data() -> String {
    render_with_commands(&nat_commands(EGRESS_INTERFACE))
}

fn render_with_commands(commands: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    for command in commands {
        script.push_str(command);
        script.push('\n');
    }

    let mut doc = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        doc,
        "Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\nMIME-Version: 1.0\n\n"
    );
    push_part(&mut doc, "text/cloud-config", "cloud-config.txt", CLOUD_CONFIG);
    push_part(&mut doc, "text/x-shellscript", "userdata.txt", &script);
    let _ = writeln!(doc, "--{BOUNDARY}--");
    doc
}

fn push_part(doc: &mut String, content_type: &str, filename: &str, body: &str) {
    let _ = write!(
        doc,
        "--{BOUNDARY}\n\
         Content-Type: {content_type}; charset=\"us-ascii\"\n\
         MIME-Version: 1.0\n\
         Content-Transfer-Encoding: 7bit\n\
         Content-Disposition: attachment; filename=\"{filename}\"\n\n\
         {body}\n"
    );
}
