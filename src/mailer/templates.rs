/// Mail templates list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Asks a freshly registered user to activate the account.
    UserInvitation,
}

#[derive(Debug, Clone)]
pub struct InvitationData {
    pub username: String,
    pub activation_url: String,
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl Template {
    pub fn subject(self, _data: &InvitationData) -> String {
        match self {
            Template::UserInvitation => "Finish registration with Social".to_string(),
        }
    }

    pub fn html_body(self, data: &InvitationData) -> String {
        let username = escape_html(&data.username);
        let url = escape_html(&data.activation_url);
        match self {
            Template::UserInvitation => format!(
                "<!doctype html>\
                 <html><body>\
                 <p>Hi {username},</p>\
                 <p>Thanks for signing up for Social. Please confirm your email to activate your account:</p>\
                 <p><a href=\"{url}\">{url}</a></p>\
                 <p>If you did not sign up, you can safely ignore this email.</p>\
                 <p>The Social team</p>\
                 </body></html>"
            ),
        }
    }
}
