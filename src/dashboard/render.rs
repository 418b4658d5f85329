/// HTML rendering for dashboard pages
///
/// Plain string building; every dynamic value goes through `html_escape`.

use super::Page;
use html_escape::{encode_double_quoted_attribute, encode_text};

const STYLE: &str = "body{font-family:sans-serif;margin:0;background:#f5f6f8;color:#222}\
nav{background:#1f3b57;padding:.6rem 1rem}nav a{color:#fff;margin-right:1rem;text-decoration:none}\
nav a.active{font-weight:bold;text-decoration:underline}main{padding:1rem 2rem}\
table{border-collapse:collapse;width:100%;background:#fff}th,td{border:1px solid #ddd;padding:.4rem .6rem;text-align:left}\
th{background:#eef1f5}.error{color:#b00020}.empty{color:#666}form.login{max-width:20rem}\
form.login label{display:block;margin-top:.6rem}form.login input{width:100%}";

/// Rows of a listing page, already converted to display text
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

fn document(title: &str, nav: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title} | labtrack</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{nav}<main>\n{body}</main>\n</body>\n</html>\n",
        title = encode_text(title),
    )
}

fn navigation(active: Page, subject: &str) -> String {
    let mut links = String::new();
    for page in Page::ALL {
        let class = if page == active { " class=\"active\"" } else { "" };
        links.push_str(&format!(
            "<a href=\"/dashboard/{}\"{}>{}</a>",
            page.slug(),
            class,
            page.title()
        ));
    }
    format!(
        "<nav>{}<a href=\"/dashboard/logout\">Log out ({})</a></nav>\n",
        links,
        encode_text(subject)
    )
}

pub fn login_page(error: Option<&str>, username: &str) -> String {
    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>\n", encode_text(message)))
        .unwrap_or_default();
    let body = format!(
        "<h1>Sign in</h1>\n{error}<form class=\"login\" method=\"post\" action=\"/dashboard/login\">\n\
         <label for=\"username\">Username or email</label>\n\
         <input id=\"username\" name=\"username\" value=\"{username}\" required>\n\
         <label for=\"password\">Password</label>\n\
         <input id=\"password\" name=\"password\" type=\"password\" required>\n\
         <p><button type=\"submit\">Log in</button></p>\n</form>\n",
        username = encode_double_quoted_attribute(username),
    );
    document("Sign in", "", &body)
}

pub fn listing_page(page: Page, subject: &str, table: &Table) -> String {
    let mut body = format!("<h1>{}</h1>\n", page.title());
    if table.rows.is_empty() {
        body.push_str("<p class=\"empty\">No records yet.</p>\n");
    } else {
        body.push_str("<table>\n<thead><tr>");
        for header in &table.headers {
            body.push_str(&format!("<th>{}</th>", encode_text(header)));
        }
        body.push_str("</tr></thead>\n<tbody>\n");
        for row in &table.rows {
            body.push_str("<tr>");
            for cell in row {
                body.push_str(&format!("<td>{}</td>", encode_text(cell)));
            }
            body.push_str("</tr>\n");
        }
        body.push_str("</tbody>\n</table>\n");
    }
    document(page.title(), &navigation(page, subject), &body)
}

pub fn not_found_page() -> String {
    document(
        "Not found",
        "",
        "<h1>Page not found</h1>\n<p><a href=\"/dashboard/\">Back to the dashboard</a></p>\n",
    )
}

pub fn error_page() -> String {
    document(
        "Error",
        "",
        "<h1>Something went wrong</h1>\n<p class=\"error\">The data could not be loaded.</p>\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_and_usernames_are_escaped() {
        let table = Table {
            headers: vec!["Name"],
            rows: vec![vec!["<script>alert(1)</script>".to_string()]],
        };
        let html = listing_page(Page::Projects, "a&b", &table);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Log out (a&amp;b)"));

        let login = login_page(Some("Invalid <credentials>"), "\"x\"");
        assert!(login.contains("Invalid &lt;credentials&gt;"));
        assert!(login.contains("value=\"&quot;x&quot;\""));
    }

    #[test]
    fn empty_tables_say_so() {
        let table = Table {
            headers: vec!["Name"],
            rows: Vec::new(),
        };
        assert!(listing_page(Page::Events, "admin", &table).contains("No records yet."));
    }
}
