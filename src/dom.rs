//! Browser popup renderer.
//!
//! Builds the overlay with plain DOM calls and reports close / Escape back
//! to the popup layer. Markup:
//!
//! ```text
//! <div role="dialog" class="popup popup--{placement}" data-popup-id="{id}">
//!   <h2 class="popup__title">…</h2>
//!   <p class="popup__body">…</p>
//!   <button class="popup__cta">…</button>
//!   <button class="popup__close">…</button>
//! </div>
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, HtmlElement, KeyboardEvent};

use crate::error::{Result, VariationError};
use crate::layers::popup::{DismissReason, PopupRenderer, PopupView};

struct MountedPopup {
    root: Element,
    // Kept alive while the listeners are attached
    on_key: Closure<dyn FnMut(KeyboardEvent)>,
    _on_close: Closure<dyn FnMut(Event)>,
}

pub struct BrowserPopupRenderer {
    document: Document,
    body: HtmlElement,
    mounted: RefCell<HashMap<String, MountedPopup>>,
    // A popup hidden from inside its own click handler can't drop that
    // handler yet; it is parked here until the next show or hide.
    retired: RefCell<Vec<MountedPopup>>,
}

impl BrowserPopupRenderer {
    /// `None` when there is no document body to render into.
    pub fn detect() -> Option<Self> {
        let document = web_sys::window()?.document()?;
        let body = document.body()?;
        Some(Self {
            document,
            body,
            mounted: RefCell::new(HashMap::new()),
            retired: RefCell::new(Vec::new()),
        })
    }

    fn element(&self, tag: &str, class: &str, text: Option<&str>) -> Result<Element> {
        let el = self
            .document
            .create_element(tag)
            .map_err(|e| VariationError::from_js("create_element", &e))?;
        el.set_class_name(class);
        if let Some(text) = text {
            el.set_text_content(Some(text));
        }
        Ok(el)
    }

    fn build(&self, view: &PopupView) -> Result<(Element, Element)> {
        let root = self.element(
            "div",
            &format!("popup popup--{}", view.placement.as_str()),
            None,
        )?;
        let attrs = [
            ("role", "dialog"),
            ("aria-modal", "true"),
            ("data-popup-id", view.id.as_str()),
        ];
        for (name, value) in attrs {
            root.set_attribute(name, value)
                .map_err(|e| VariationError::from_js("set_attribute", &e))?;
        }

        if let Some(title) = view.text("title") {
            let el = self.element("h2", "popup__title", Some(title))?;
            root.append_child(&el)
                .map_err(|e| VariationError::from_js("append title", &e))?;
        }
        if let Some(body) = view.text("body") {
            let el = self.element("p", "popup__body", Some(body))?;
            root.append_child(&el)
                .map_err(|e| VariationError::from_js("append body", &e))?;
        }
        if let Some(cta) = view.text("cta") {
            let el = self.element("button", "popup__cta", Some(cta))?;
            root.append_child(&el)
                .map_err(|e| VariationError::from_js("append cta", &e))?;
        }
        let close = self.element(
            "button",
            "popup__close",
            Some(view.text("dismiss").unwrap_or("Close")),
        )?;
        close
            .set_attribute("type", "button")
            .map_err(|e| VariationError::from_js("set_attribute", &e))?;
        root.append_child(&close)
            .map_err(|e| VariationError::from_js("append close", &e))?;
        Ok((root, close))
    }

    fn detach(&self, popup: &MountedPopup) {
        let _ = self
            .document
            .remove_event_listener_with_callback("keydown", popup.on_key.as_ref().unchecked_ref());
        popup.root.remove();
    }
}

impl PopupRenderer for BrowserPopupRenderer {
    fn show(&self, view: &PopupView, on_dismiss: Rc<dyn Fn(DismissReason)>) -> Result<()> {
        self.retired.borrow_mut().clear();
        if let Some(previous) = self.mounted.borrow_mut().remove(&view.id) {
            self.detach(&previous);
        }

        let (root, close) = self.build(view)?;

        let dismiss = Rc::clone(&on_dismiss);
        let on_key = Closure::wrap(Box::new(move |event: KeyboardEvent| {
            if event.key() == "Escape" {
                dismiss(DismissReason::Escape);
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);

        let dismiss = Rc::clone(&on_dismiss);
        let on_close = Closure::wrap(Box::new(move |_event: Event| {
            dismiss(DismissReason::Close);
        }) as Box<dyn FnMut(Event)>);

        close
            .add_event_listener_with_callback("click", on_close.as_ref().unchecked_ref())
            .map_err(|e| VariationError::from_js("close listener", &e))?;
        self.document
            .add_event_listener_with_callback("keydown", on_key.as_ref().unchecked_ref())
            .map_err(|e| VariationError::from_js("keydown listener", &e))?;
        self.body
            .append_child(&root)
            .map_err(|e| VariationError::from_js("append popup", &e))?;

        self.mounted.borrow_mut().insert(
            view.id.clone(),
            MountedPopup {
                root,
                on_key,
                _on_close: on_close,
            },
        );
        Ok(())
    }

    fn hide(&self, id: &str) {
        let Some(popup) = self.mounted.borrow_mut().remove(id) else {
            return;
        };
        self.detach(&popup);
        self.retired.borrow_mut().push(popup);
    }
}
