//! The host side: find widget instances in an HTML page, give each one
//! a slot to be rendered into, and put the page back together.

use anyhow::{Result, Context, anyhow};
use html5gum::{DefaultEmitter, Token, Tokenizer, HtmlString};
use kstring::KString;

use crate::{registry::WidgetRegistry,
            target::SharedBuffer,
            template::html_escape_into,
            nowarn as warn, info};


const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "source", "track", "wbr",
];

// The ones html5gum's state switching tokenizes as raw text.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "xmp", "noembed", "noframe", "noscript", "plaintext",
];

fn html_str(s: &HtmlString) -> Result<&str> {
    std::str::from_utf8(&**s).with_context(|| anyhow!("non-UTF-8 HTML token {s:?}"))
}

enum Chunk {
    Html(String),
    /// Index into `Page::instances`
    Slot(usize),
}

struct Instance {
    tag: KString,
    output: SharedBuffer,
}

struct OpenElement {
    name: String,
    is_attach_point: bool,
    slot: Option<usize>,
}

fn cut_at_slot(out: &mut String, chunks: &mut Vec<Chunk>, slot: usize) {
    chunks.push(Chunk::Html(std::mem::take(out)));
    chunks.push(Chunk::Slot(slot));
}

/// A scanned page.
pub struct Page {
    chunks: Vec<Chunk>,
    instances: Vec<Instance>,
}

impl Page {
    /// Only instances inside the `attach_point` element count, or
    /// anywhere if the page has no such element.
    pub fn scan(html: &str, registry: &WidgetRegistry, attach_point: &str) -> Result<Page> {
        let mut emitter = DefaultEmitter::default();
        emitter.switch_states(true);
        let tokens: Vec<Token> = Tokenizer::new_with_emitter(html, emitter)
            .infallible().collect();
        let mut has_attach_point = false;
        for token in &tokens {
            if let Token::StartTag(tag) = token {
                if html_str(&tag.name)? == attach_point {
                    has_attach_point = true;
                    break
                }
            }
        }

        let mut chunks = Vec::new();
        let mut instances = Vec::new();
        let mut out = String::new();
        let mut stack: Vec<OpenElement> = Vec::new();

        for token in tokens {
            match token {
                Token::StartTag(tag) => {
                    let name = html_str(&tag.name)?;
                    out.push('<');
                    out.push_str(name);
                    for (k, v) in &tag.attributes {
                        out.push(' ');
                        out.push_str(html_str(k)?);
                        out.push_str("=\"");
                        html_escape_into(&mut out, html_str(v)?);
                        out.push('"');
                    }
                    let in_scope = ! has_attach_point
                        || stack.iter().any(|e| e.is_attach_point);
                    let slot = if in_scope && registry.is_widget(name) {
                        instances.push(Instance {
                            tag: KString::from_ref(name),
                            output: SharedBuffer::new(),
                        });
                        Some(instances.len() - 1)
                    } else {
                        None
                    };
                    if tag.self_closing || VOID_ELEMENTS.contains(&name) {
                        if let Some(slot) = slot {
                            out.push('>');
                            cut_at_slot(&mut out, &mut chunks, slot);
                            out.push_str("</");
                            out.push_str(name);
                            out.push('>');
                        } else {
                            out.push_str(if tag.self_closing { "/>" } else { ">" });
                        }
                    } else {
                        out.push('>');
                        stack.push(OpenElement {
                            name: name.into(),
                            is_attach_point: name == attach_point,
                            slot,
                        });
                    }
                }
                Token::EndTag(tag) => {
                    let name = html_str(&tag.name)?;
                    if let Some(i) = stack.iter().rposition(|e| e.name == name) {
                        // Implicitly closes whatever is still open
                        // inside it.
                        for e in stack.drain(i..).rev() {
                            if let Some(slot) = e.slot {
                                cut_at_slot(&mut out, &mut chunks, slot);
                            }
                        }
                    } else {
                        warn!("stray end tag {name:?}");
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
                Token::String(s) => {
                    let s = html_str(&s)?;
                    let raw = stack.last()
                        .map(|e| RAW_TEXT_ELEMENTS.contains(&e.name.as_str()))
                        .unwrap_or(false);
                    if raw {
                        out.push_str(s);
                    } else {
                        html_escape_into(&mut out, s);
                    }
                }
                Token::Comment(s) => {
                    out.push_str("<!--");
                    out.push_str(html_str(&s)?);
                    out.push_str("-->");
                }
                Token::Doctype(d) => {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(html_str(&d.name)?);
                    out.push('>');
                }
                Token::Error(_e) => {
                    warn!("HTML5 parsing error: {_e}");
                }
            }
        }
        // unclosed at the end of the document
        for e in stack.drain(..).rev() {
            if let Some(slot) = e.slot {
                cut_at_slot(&mut out, &mut chunks, slot);
            }
        }
        chunks.push(Chunk::Html(out));
        Ok(Page { chunks, instances })
    }

    /// The widget instances found, in document order.
    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(|i| i.tag.as_str())
    }

    /// Fire the render trigger of every instance. Where the output
    /// appears depends on when the responses come in.
    pub fn fire(&self, registry: &WidgetRegistry) {
        for instance in &self.instances {
            if let Some(trigger) = registry.render_trigger(&instance.tag) {
                info!("rendering instance of {:?}", instance.tag.as_str());
                trigger.fire(Box::new(instance.output.clone()));
            }
        }
    }

    /// The document with what has been attached so far.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Html(s) => out.push_str(s),
                Chunk::Slot(i) => for s in self.instances[*i].output.contents() {
                    out.push_str(&s)
                }
            }
        }
        out
    }
}

/// Scan `html`, render all widget instances in it, run `drain` to
/// have the responses delivered, and return the resulting document.
pub fn render_page(
    html: &str,
    registry: &WidgetRegistry,
    attach_point: &str,
    drain: impl FnOnce() -> usize,
) -> Result<String> {
    let page = Page::scan(html, registry, attach_point)?;
    page.fire(registry);
    let n = drain();
    info!("page: {} widget instances, {n} responses", page.instances.len());
    Ok(page.to_html())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use serde_json::json;

    use crate::{api::ApiClient,
                fixtures::{ModelRequest, Settings, WidgetDescriptor},
                renderer::TemplateRenderer,
                template::Interpolator,
                transport::testing::ScriptedTransport};

    fn registry() -> Result<(Rc<ScriptedTransport>, WidgetRegistry)> {
        let transport = Rc::new(ScriptedTransport::new());
        let api = Rc::new(ApiClient::new(transport.clone(), "/api/"));
        let renderer = TemplateRenderer::new(api, Rc::new(Settings::default()),
                                             Rc::new(Interpolator));
        let mut r = WidgetRegistry::new(renderer);
        r.register(WidgetDescriptor::new("x-header", vec![])?.with_template("<h1>Hi</h1>"))?;
        r.register(WidgetDescriptor::new(
            "sidebar", vec![ModelRequest::new("category").with_scope_key("c")])?
                   .with_template("<i>{{c.0.name}}</i>"))?;
        Ok((transport, r))
    }

    const PAGE: &str = "<!DOCTYPE html><html><head><title>A &amp; B</title>\
                        <x-header></x-header></head>\
                        <body class=\"main\"><x-header><span>old</span></x-header>\
                        <p>1 &lt; 2<br></p><sidebar></sidebar><!-- c --></body></html>";

    #[test]
    fn t_scan_inside_attach_point_only() -> Result<()> {
        let (_, r) = registry()?;
        let page = Page::scan(PAGE, &r, "body")?;
        assert_eq!(page.instances().collect::<Vec<_>>(), vec!["x-header", "sidebar"]);
        // no output attached yet: the document comes out as it went in
        assert_eq!(page.to_html(), PAGE);
        Ok(())
    }

    #[test]
    fn t_scan_whole_document_without_attach_point() -> Result<()> {
        let (_, r) = registry()?;
        let page = Page::scan("<div><x-header/></div><sidebar>", &r, "body")?;
        assert_eq!(page.instances().collect::<Vec<_>>(), vec!["x-header", "sidebar"]);
        assert_eq!(page.to_html(), "<div><x-header></x-header></div><sidebar>");
        Ok(())
    }

    #[test]
    fn t_scan_script_and_style_raw() -> Result<()> {
        let (_, r) = registry()?;
        let html = "<body><script>if (a<b && c>d) f(\"<sidebar></p>\");</script>\
                    <style>a > b { content: \"&amp;\" }</style><sidebar></sidebar></body>";
        let page = Page::scan(html, &r, "body")?;
        assert_eq!(page.instances().collect::<Vec<_>>(), vec!["sidebar"]);
        assert_eq!(page.to_html(), html);
        Ok(())
    }

    #[test]
    fn t_render_page() -> Result<()> {
        let (transport, r) = registry()?;
        let html = render_page(PAGE, &r, "body", || transport.run(|request| {
            (request.param("model") == Some("category"))
                .then(|| json!({"models": ["{\"name\": \"Fiction\"}"]}))
        }))?;
        assert_eq!(html,
                   "<!DOCTYPE html><html><head><title>A &amp; B</title>\
                    <x-header></x-header></head>\
                    <body class=\"main\"><x-header><span>old</span><h1>Hi</h1></x-header>\
                    <p>1 &lt; 2<br></p><sidebar><i>Fiction</i></sidebar><!-- c --></body></html>");
        Ok(())
    }

    #[test]
    fn t_render_page_stalled_widget_left_empty() -> Result<()> {
        let (_transport, r) = registry()?;
        let html = render_page("<body><sidebar></sidebar><x-header></x-header></body>",
                               &r, "body", || 0)?;
        assert_eq!(html, "<body><sidebar></sidebar><x-header><h1>Hi</h1></x-header></body>");
        Ok(())
    }
}
