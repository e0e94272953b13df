use gtk4::gdk;
use gtk4::glib;
use gtk4::prelude::*;
use webkit6::prelude::*;

use mdnotes_core::gatekeeper::NavigationGatekeeper;

/// Build the web view for one session. Every top-level or new-window
/// navigation is run past `gatekeeper` before WebKit follows it. Only
/// navigations the user started may be handed to the desktop, so embedded
/// frames and scripts cannot open the browser on their own.
pub fn build_notes_view(gatekeeper: NavigationGatekeeper) -> webkit6::WebView {
    let webview = webkit6::WebView::new();
    webview.set_hexpand(true);
    webview.set_vexpand(true);

    webview.connect_decide_policy(move |webview, decision, decision_type| {
        let new_window = match decision_type {
            webkit6::PolicyDecisionType::NavigationAction => false,
            webkit6::PolicyDecisionType::NewWindowAction => true,
            _ => return false,
        };

        let Some(requested) = requested_navigation(decision) else {
            decision.ignore();
            return true;
        };

        let verdict = if requested.user_gesture {
            gatekeeper.decide(&requested.uri)
        } else {
            gatekeeper.decide_unprompted(&requested.uri)
        };

        if !verdict.loads_in_view() {
            decision.ignore();
        } else if new_window {
            // Notes windows have no tabs; same-origin popups load in place.
            decision.ignore();
            webview.load_uri(&requested.uri);
        } else {
            decision.use_();
        }
        true
    });

    install_history_keys(&webview);
    webview
}

struct RequestedNavigation {
    uri: String,
    user_gesture: bool,
}

fn requested_navigation(decision: &webkit6::PolicyDecision) -> Option<RequestedNavigation> {
    let navigation = decision.downcast_ref::<webkit6::NavigationPolicyDecision>()?;
    let mut action = navigation.navigation_action()?;
    let user_gesture = action.is_user_gesture();
    let request = action.request()?;
    let uri = request.uri()?.to_string();
    Some(RequestedNavigation { uri, user_gesture })
}

/// Alt+Left / Alt+Right walk the session's history.
fn install_history_keys(webview: &webkit6::WebView) {
    let key_controller = gtk4::EventControllerKey::new();
    let webview_weak = webview.downgrade();
    key_controller.connect_key_pressed(move |_, key, _, state| {
        if !state.contains(gdk::ModifierType::ALT_MASK) {
            return glib::Propagation::Proceed;
        }
        let Some(webview) = webview_weak.upgrade() else {
            return glib::Propagation::Proceed;
        };
        if key == gdk::Key::Left && webview.can_go_back() {
            webview.go_back();
            glib::Propagation::Stop
        } else if key == gdk::Key::Right && webview.can_go_forward() {
            webview.go_forward();
            glib::Propagation::Stop
        } else {
            glib::Propagation::Proceed
        }
    });
    webview.add_controller(key_controller);
}
