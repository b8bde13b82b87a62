use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::language::Bundle;
use crate::models::Page;
use crate::utils::{href_encode, html_escape};

const STYLE: &str = r#"
<meta name="viewport"
      content="width=device-width,initial-scale=1,maximum-scale=1" />
<style type="text/css">
<!--
* {margin: 0; padding: 0;}
body {text-align: center; background-color: #eee; font-family: sans-serif;
      color:#777;}
div {word-wrap: break-word;}
img {max-width: 100%;}
a {color: #4499cc; text-decoration: none;}
.container {max-width: 700px; margin: auto; background-color: #fff;}
.box {padding-top: 20px; padding-bottom: 20px;}
#linkurl {background-color: #333;}
#linkurl a {color: #ddd; text-decoration: none;}
#linkurl a:hover {color: #fff;}
#message {padding: 5px 0; font-size: 2em; font-weight: lighter;
          letter-spacing: -2px; line-height: 50px; color: #aaa;}
#sending {display: none; font-style: italic;}
#sending .text {padding-top: 10px; color: #bbb; font-size: 0.8em;}
#wrapform {height: 90px; padding-top:40px;}
#progress {display: inline;  border-collapse: separate; empty-cells: show;
           border-spacing: 24px 0; padding: 0; vertical-align: bottom;}
#progress td {height: 17px; width: 17px; background-color: #eee;
              padding: 0px; border-radius: 90px; box-shadow: 0 0 3px #bbb;}
#userinfo {padding-bottom: 20px;}
#files {margin: auto; padding: 13px 0; text-align: left; overflow: auto;
        margin-bottom: 20px;}
#files a {text-decoration: none; display: block; padding: 10px 20px;}
#files a:nth-child(2n+1) {background-color: #F7F7F7;}
#files a:link {color: #4499cc}
#files a:visited {color: #a0c0e0}
#files a:hover {background-color:#f0f0f0}
--></style>"#;

const USERINFO: &str = r#"
<div id="userinfo">
  {{message}}
  {{divpicture}}
</div>
"#;

const MAIN_HEAD: &str = r#"<!doctype html>
<html>
<head>
<title>{{maintitle}}</title>
"#;

const MAIN_BODY: &str = r##"
<script language="JavaScript">
function swap() {
   document.getElementById("form").style.display = "none";
   document.getElementById("sending").style.display = "block";
   pulse(0);
}

function pulse(i) {
    var NUMCELL = 5;
    var cell = document.getElementById("cell-" + (i % NUMCELL));
    var prev = document.getElementById("cell-"+((i - 1 + NUMCELL) % NUMCELL));
    cell.style.backgroundColor = "#7ac";
    prev.style.backgroundColor = "#eee";
    setTimeout(function() {pulse(i+1);}, 300);
}

function onunload() {
   document.getElementById("form").style.display = "block";
   document.getElementById("sending").style.display = "none";
}
</script></head>
<body>
{{linkurl}}
<div class="container">
<div id="wrapform">
  <div id="form" class="box">
    <form method="post" enctype="multipart/form-data" action="">
      <input name="{{field}}" type="file" multiple="yes">
      <input value="{{submit}}" onclick="swap()" type="submit">
    </form>
  </div>
  <div id="sending" class="box">
    <table id="progress">
      <tr>
        <td id="cell-0"/><td id="cell-1"/><td id="cell-2"/>
        <td id="cell-3"/><td id="cell-4"/>
      </tr>
    </table>
    <div class="text">{{sending}}</div>
  </div>
</div>
"##;

const MAIN_TAIL: &str = r#"
{{files}}
</div>
</body>
</html>
"#;

const NOTICE_TAIL: &str = r#"
</div>
</body>
</html>
"#;

const LINKURL: &str = r#"<div id="linkurl" class="box">
<a href="http://stackp.online.fr/droopy-ip.php?port={{port}}&ssl={{ssl}}"> {{discover}}
</a></div>"#;

const DIV_PICTURE: &str = r#"<div class="box"><img src="/__droopy/picture"/></div>"#;

fn notice_page(title_key: &str, text_key: &str, link_key: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head><title> {{{{{title_key}}}}} </title>\n{STYLE}\n</head>\n<body>\n\
         <div class=\"container\">\n<div id=\"wrapform\">\n  <div class=\"box\">\n    {{{{{text_key}}}}}\n    \
         <a href=\"/\"> {{{{{link_key}}}}} </a>\n  </div>\n</div>\n{USERINFO}{NOTICE_TAIL}"
    )
}

/// page templates with `{{key}}` placeholders
#[derive(Debug, Clone)]
pub struct Templates {
    pub main: String,
    pub success: String,
    pub error: String,
    pub linkurl: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            main: format!("{MAIN_HEAD}{STYLE}{MAIN_BODY}{USERINFO}{MAIN_TAIL}"),
            success: notice_page("successtitle", "received", "another"),
            error: notice_page("errortitle", "problem", "retry"),
            linkurl: LINKURL.to_string(),
        }
    }
}

impl Templates {
    fn page(&self, page: Page) -> &str {
        match page {
            Page::Main => &self.main,
            Page::Success => &self.success,
            Page::Error => &self.error,
        }
    }
}

/// per-request inputs to a render
pub struct RenderContext<'a> {
    pub bundle: &'a Bundle,
    pub client: Option<IpAddr>,
    /// published names; `None` when publish-files is off
    pub files: Option<&'a [String]>,
}

/// fills templates with localized and per-request content
#[derive(Debug, Clone)]
pub struct Renderer {
    templates: Templates,
    message: String,
    has_picture: bool,
    field: String,
    port: u16,
    tls: bool,
}

impl Renderer {
    pub fn new(
        templates: Templates,
        message: String,
        has_picture: bool,
        field: String,
        port: u16,
        tls: bool,
    ) -> Self {
        Self {
            templates,
            message,
            has_picture,
            field,
            port,
            tls,
        }
    }

    pub fn render(&self, page: Page, ctx: &RenderContext<'_>) -> String {
        let mut values: HashMap<&str, String> = ctx
            .bundle
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();

        values.insert(
            "message",
            if self.message.is_empty() {
                String::new()
            } else {
                format!(r#"<div id="message">{}</div>"#, self.message)
            },
        );
        values.insert(
            "divpicture",
            if self.has_picture {
                DIV_PICTURE.to_string()
            } else {
                String::new()
            },
        );
        values.insert("field", html_escape(&self.field));
        values.insert("files", ctx.files.map(file_links).unwrap_or_default());

        let linkurl = if ctx.client.is_some_and(is_loopback_v4) {
            values.insert("port", self.port.to_string());
            values.insert("ssl", u8::from(self.tls).to_string());
            fill(&self.templates.linkurl, &values)
        } else {
            String::new()
        };
        values.insert("linkurl", linkurl);

        fill(self.templates.page(page), &values)
    }
}

// only the literal 127.0.0.1, in v4 or v4-mapped v6 form
fn is_loopback_v4(ip: IpAddr) -> bool {
    ip.to_canonical() == IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn file_links(names: &[String]) -> String {
    let links: String = names
        .iter()
        .map(|name| format!(r#"<a href="/{}">{}</a>"#, href_encode(name), html_escape(name)))
        .collect();
    format!(r#"<div id="files">{links}</div>"#)
}

/// substitute every `{{key}}`; unknown keys become empty
pub fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                if let Some(value) = values.get(key) {
                    out.push_str(value);
                } else {
                    tracing::trace!("No value for template key {:?}", key);
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
