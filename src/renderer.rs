//! Rendering one widget instance: models first, then the template,
//! then attaching the compiled result.

use std::rc::Rc;

use kstring::KString;
use serde_json::Value;

use crate::{api::ApiClient,
            context::RenderContext,
            json_path::resolve,
            fixtures::{Settings, WidgetDescriptor, ModelRequest},
            sequencer::resolve_all,
            target::AttachTarget,
            template::TemplateCompiler,
            warn, info};


/// The template string at `path` in a template response. With
/// nothing at `path`, a string at its parent is taken instead, for
/// templates stored as bare strings.
fn template_at(response: &Value, path: &str) -> Option<String> {
    match resolve(response, path) {
        Some(Value::String(s)) => Some(s),
        Some(_) => None,
        None => {
            let (parent, _) = path.rsplit_once('.')?;
            match resolve(response, parent)? {
                Value::String(s) => Some(s),
                _ => None,
            }
        }
    }
}

#[derive(Clone)]
pub struct TemplateRenderer {
    api: Rc<ApiClient>,
    settings: Rc<Settings>,
    compiler: Rc<dyn TemplateCompiler>,
}

impl TemplateRenderer {
    pub fn new(
        api: Rc<ApiClient>,
        settings: Rc<Settings>,
        compiler: Rc<dyn TemplateCompiler>
    ) -> Self {
        TemplateRenderer { api, settings, compiler }
    }

    /// Render `descriptor` into `target`. Returns right away; the
    /// output is appended once all models and the template have
    /// arrived. If anything fails or never arrives, `target` gets
    /// nothing.
    pub fn render(&self, descriptor: Rc<WidgetDescriptor>, target: Box<dyn AttachTarget>) {
        let mut context = RenderContext::new();
        for o in &descriptor.models_override {
            context.insert(&o.scope_key, Some(o.value.clone()));
        }
        let models: Rc<[ModelRequest]> = descriptor.models.clone().into();
        let this = self.clone();
        resolve_all(
            self.api.clone(),
            models,
            self.settings.default_models_data_path.as_str().into(),
            context,
            Box::new(move |context| this.template_phase(descriptor, context, target)));
    }

    fn template_phase(
        &self,
        descriptor: Rc<WidgetDescriptor>,
        context: RenderContext,
        target: Box<dyn AttachTarget>,
    ) {
        if let Some(template) = &descriptor.template {
            return self.attach(&descriptor.tag, template, &context, target)
        }
        let params = vec![
            (KString::from_static("model"), KString::from_static("widget")),
            (KString::from_static("filter"), KString::from_string(
                format!("name:{}", descriptor.tag))),
        ];
        let path = descriptor.template_data_path.as_deref()
            .unwrap_or(&self.settings.default_template_data_path)
            .to_string();
        let this = self.clone();
        let url = descriptor.template_url.clone();
        self.api.get(url.as_deref(), params, None, move |response| {
            match response.as_ref().and_then(|r| template_at(r, &path)) {
                Some(template) =>
                    this.attach(&descriptor.tag, &template, &context, target),
                None => warn!("widget {:?}: no template string at {path:?}, \
                               nothing attached",
                              descriptor.tag.as_str()),
            }
        });
    }

    fn attach(
        &self,
        tag: &str,
        template: &str,
        context: &RenderContext,
        mut target: Box<dyn AttachTarget>
    ) {
        match self.compiler.compile(template, context) {
            Ok(html) => {
                info!("widget {tag:?}: attaching {} bytes", html.len());
                target.append(html)
            }
            Err(e) => warn!("widget {tag:?}: template does not compile, \
                             nothing attached: {e}")
        }
    }
}
