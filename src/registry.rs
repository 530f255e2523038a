//! Which tags are widgets, and how to render them.

use std::{collections::BTreeMap, rc::Rc};

use kstring::KString;

use crate::{api::ApiClient,
            fixtures::{Fixtures, WidgetDescriptor},
            renderer::TemplateRenderer,
            target::AttachTarget,
            template::Interpolator,
            transport::Transport,
            info};


#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("widget tag {0:?} is already registered")]
    DuplicateTag(String),
}

/// The capability to render one registered widget, handed to the
/// host for every instance of the tag it finds.
#[derive(Clone)]
pub struct RenderTrigger {
    descriptor: Rc<WidgetDescriptor>,
    renderer: TemplateRenderer,
}

impl RenderTrigger {
    pub fn tag(&self) -> &str {
        &self.descriptor.tag
    }

    /// Start rendering one instance into `target`.
    pub fn fire(&self, target: Box<dyn AttachTarget>) {
        self.renderer.render(self.descriptor.clone(), target)
    }
}

pub struct WidgetRegistry {
    renderer: TemplateRenderer,
    widgets: BTreeMap<KString, Rc<WidgetDescriptor>>,
}

impl WidgetRegistry {
    pub fn new(renderer: TemplateRenderer) -> Self {
        WidgetRegistry { renderer, widgets: BTreeMap::new() }
    }

    /// A tag can be registered once; a second registration is
    /// refused, the first descriptor stays.
    pub fn register(&mut self, descriptor: WidgetDescriptor) -> Result<(), RegistryError> {
        if self.widgets.contains_key(&descriptor.tag) {
            return Err(RegistryError::DuplicateTag(descriptor.tag.to_string()))
        }
        info!("registering widget {:?} ({} models)",
              descriptor.tag.as_str(), descriptor.models.len());
        self.widgets.insert(descriptor.tag.clone(), Rc::new(descriptor));
        Ok(())
    }

    /// The widgets of `fixtures`, rendered through `transport` with
    /// the fixtures' settings and the default compiler.
    pub fn from_fixtures(
        transport: Rc<dyn Transport>,
        fixtures: &Fixtures
    ) -> Result<Self, RegistryError> {
        let settings = Rc::new(fixtures.settings.clone());
        let api = Rc::new(ApiClient::new(transport, &settings.default_api_url));
        let mut registry = WidgetRegistry::new(
            TemplateRenderer::new(api, settings, Rc::new(Interpolator)));
        registry.register_all(fixtures)?;
        Ok(registry)
    }

    pub fn register_all(&mut self, fixtures: &Fixtures) -> Result<(), RegistryError> {
        for w in &fixtures.widgets {
            self.register(w.clone())?;
        }
        Ok(())
    }

    pub fn lookup(&self, tag: &str) -> Option<&WidgetDescriptor> {
        self.widgets.get(tag).map(|d| &**d)
    }

    pub fn is_widget(&self, tag: &str) -> bool {
        self.widgets.contains_key(tag)
    }

    /// Sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.widgets.keys().map(|k| k.as_str())
    }

    pub fn render_trigger(&self, tag: &str) -> Option<RenderTrigger> {
        let descriptor = self.widgets.get(tag)?.clone();
        Some(RenderTrigger { descriptor, renderer: self.renderer.clone() })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    use crate::{fixtures::{ModelRequest, Settings},
                target::SharedBuffer,
                transport::testing::ScriptedTransport};

    fn registry() -> (Rc<ScriptedTransport>, WidgetRegistry) {
        let transport = Rc::new(ScriptedTransport::new());
        let api = Rc::new(ApiClient::new(transport.clone(), "/api/"));
        let renderer = TemplateRenderer::new(api, Rc::new(Settings::default()),
                                             Rc::new(Interpolator));
        (transport, WidgetRegistry::new(renderer))
    }

    #[test]
    fn t_register_and_lookup() -> Result<()> {
        let (_, mut r) = registry();
        r.register(WidgetDescriptor::new("sidebar", vec![ModelRequest::new("category")])?)?;
        r.register(WidgetDescriptor::new("header", vec![])?)?;
        assert!(r.is_widget("sidebar"));
        assert!(!r.is_widget("footer"));
        assert_eq!(r.lookup("sidebar").map(|d| d.models.len()), Some(1));
        assert_eq!(r.tags().collect::<Vec<_>>(), vec!["header", "sidebar"]);
        assert!(r.render_trigger("footer").is_none());
        Ok(())
    }

    #[test]
    fn t_duplicate_keeps_first() -> Result<()> {
        let (_, mut r) = registry();
        r.register(WidgetDescriptor::new("header", vec![])?.with_template("first"))?;
        assert_eq!(r.register(WidgetDescriptor::new("header", vec![])?.with_template("second")),
                   Err(RegistryError::DuplicateTag("header".into())));
        assert_eq!(r.lookup("header").and_then(|d| d.template.as_deref()), Some("first"));
        Ok(())
    }

    #[test]
    fn t_register_all() -> Result<()> {
        let (_, mut r) = registry();
        let f = Fixtures::from_json_str(
            r#"{"widgets": [{"name": "header"}, {"name": "sidebar"}]}"#)?;
        r.register_all(&f)?;
        assert_eq!(r.tags().count(), 2);
        // the same table again collides on the first tag
        assert_eq!(r.register_all(&f), Err(RegistryError::DuplicateTag("header".into())));
        Ok(())
    }

    #[test]
    fn t_from_fixtures() -> Result<()> {
        let transport = Rc::new(ScriptedTransport::new());
        let f = Fixtures::from_json_str(
            r#"{"widgets": [{"name": "header", "template": "<h1>{{x.y}}</h1>",
                             "models": [{"model": "thing", "scope_key": "x"}]}],
                "settings": {"default_api_url": "/v2/api/",
                             "default_models_data_path": "data"}}"#)?;
        let r = WidgetRegistry::from_fixtures(transport.clone(), &f)?;
        let out = SharedBuffer::new();
        r.render_trigger("header").expect("registered").fire(Box::new(out.clone()));
        assert_eq!(transport.requests()[0].url.as_str(), "/v2/api/");
        transport.respond(0, json!({"y": "Y"}));
        assert_eq!(out.contents(), vec!["<h1>Y</h1>".to_string()]);
        Ok(())
    }

    #[test]
    fn t_trigger_renders_each_instance() -> Result<()> {
        let (transport, mut r) = registry();
        r.register(WidgetDescriptor::new("sidebar", vec![ModelRequest::new("category")])?
                   .with_template("<b>{{category.0}}</b>"))?;
        let trigger = r.render_trigger("sidebar").expect("registered");
        assert_eq!(trigger.tag(), "sidebar");
        let (a, b) = (SharedBuffer::new(), SharedBuffer::new());
        trigger.fire(Box::new(a.clone()));
        trigger.fire(Box::new(b.clone()));
        assert_eq!(transport.waiting(), vec![0, 1]);
        transport.respond(0, json!({"models": ["1"]}));
        transport.respond(1, json!({"models": ["2"]}));
        assert_eq!(a.contents(), vec!["<b>1</b>".to_string()]);
        assert_eq!(b.contents(), vec!["<b>2</b>".to_string()]);
        Ok(())
    }
}
