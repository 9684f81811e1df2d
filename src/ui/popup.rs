/// Popup UI for the tab grouper extension

use yew::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, HtmlSelectElement};
use patternfly_yew::prelude::*;
use serde::Serialize;
use crate::dispatcher::{Command, CommandResponse};
use crate::domain::{is_valid_domain_pattern, normalize_pattern};
use crate::storage::Settings;
use crate::tab_data::GroupColor;

// Import JS bridge functions
#[wasm_bindgen(module = "/popup.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn sendCommand(message: JsValue) -> Result<JsValue, JsValue>;
}

#[derive(Clone, PartialEq)]
enum AppState {
    Idle,
    Loading(String),
    Done(String),
    Error(String),
}

/// Human readable text for a failure reason from the background
fn describe(reason: Option<&str>) -> String {
    match reason {
        Some("invalid_domain") => "Please enter a valid domain (e.g., example.com or *.example.com)".to_string(),
        Some("already_excluded") => "Domain is already excluded".to_string(),
        Some("not_excluded") => "Domain not found in excluded list".to_string(),
        Some("missing_color") => "Please select a color".to_string(),
        Some("invalid_color") => "Unknown group color".to_string(),
        Some("empty_name") => "Please enter a group name".to_string(),
        Some("no_color_set") => "Domain not found in color settings".to_string(),
        Some("no_name_set") => "Domain not found in name settings".to_string(),
        Some(other) => other.to_string(),
        None => "Unknown error".to_string(),
    }
}

/// Validate a domain field before it is sent
fn checked_domain(input: &str) -> Result<String, String> {
    let domain = normalize_pattern(input);
    if domain.is_empty() {
        return Err("Please enter a domain".to_string());
    }
    if !is_valid_domain_pattern(&domain) {
        return Err(describe(Some("invalid_domain")));
    }
    Ok(domain)
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Loading("Loading settings...".to_string()));
    let settings = use_state(Settings::new);
    let exclude_input = use_state(String::new);
    let color_domain_input = use_state(String::new);
    let color_choice = use_state(|| GroupColor::Blue);
    let name_domain_input = use_state(String::new);
    let name_input = use_state(String::new);

    // Load settings on mount
    {
        let state = state.clone();
        let settings = settings.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                match current_settings().await {
                    Ok(current) => {
                        settings.set(current);
                        state.set(AppState::Idle);
                    }
                    Err(e) => state.set(AppState::Error(format!("Failed to load settings: {}", e))),
                }
            });
            || ()
        });
    }

    // Send a command, then refresh the settings shown
    let run = {
        let state = state.clone();
        let settings = settings.clone();
        move |command: Command, done: &'static str| {
            let state = state.clone();
            let settings = settings.clone();
            state.set(AppState::Loading("Working...".to_string()));
            spawn_local(async move {
                match apply(command).await {
                    Ok(current) => {
                        settings.set(current);
                        state.set(AppState::Done(done.to_string()));
                    }
                    Err(e) => state.set(AppState::Error(e)),
                }
            });
        }
    };

    let on_group_now = {
        let run = run.clone();
        Callback::from(move |_| run(Command::GroupTabs, "Tabs grouped"))
    };

    let on_toggle_auto = {
        let run = run.clone();
        Callback::from(move |e: Event| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                run(Command::ToggleAutoGroup { enabled: input.checked() }, "Auto-grouping updated");
            }
        })
    };

    let on_toggle_subdomain = {
        let run = run.clone();
        Callback::from(move |e: Event| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                run(Command::ToggleSubdomainGrouping { enabled: input.checked() }, "Subdomain grouping updated");
            }
        })
    };

    let on_add_exclusion = {
        let run = run.clone();
        let state = state.clone();
        let exclude_input = exclude_input.clone();
        Callback::from(move |_| match checked_domain(&exclude_input) {
            Ok(domain) => {
                exclude_input.set(String::new());
                run(Command::AddExcludedDomain { domain }, "Domain excluded");
            }
            Err(e) => state.set(AppState::Error(e)),
        })
    };

    let on_remove_exclusion = {
        let run = run.clone();
        move |domain: String| {
            let run = run.clone();
            Callback::from(move |_: MouseEvent| run(Command::RemoveExcludedDomain { domain: domain.clone() }, "Domain removed"))
        }
    };

    let on_color_choice = {
        let color_choice = color_choice.clone();
        Callback::from(move |e: Event| {
            if let Some(select) = e.target_dyn_into::<HtmlSelectElement>() {
                if let Ok(color) = select.value().parse::<GroupColor>() {
                    color_choice.set(color);
                }
            }
        })
    };

    let on_set_color = {
        let run = run.clone();
        let state = state.clone();
        let color_domain_input = color_domain_input.clone();
        let color_choice = color_choice.clone();
        Callback::from(move |_| match checked_domain(&color_domain_input) {
            Ok(domain) => {
                color_domain_input.set(String::new());
                let color = color_choice.as_str().to_string();
                run(Command::SetDomainColor { domain, color }, "Color saved");
            }
            Err(e) => state.set(AppState::Error(e)),
        })
    };

    let on_remove_color = {
        let run = run.clone();
        move |domain: String| {
            let run = run.clone();
            Callback::from(move |_: MouseEvent| run(Command::RemoveDomainColor { domain: domain.clone() }, "Color removed"))
        }
    };

    let on_set_name = {
        let run = run.clone();
        let state = state.clone();
        let name_domain_input = name_domain_input.clone();
        let name_input = name_input.clone();
        Callback::from(move |_| {
            let domain = match checked_domain(&name_domain_input) {
                Ok(domain) => domain,
                Err(e) => return state.set(AppState::Error(e)),
            };
            let name = name_input.trim().to_string();
            if name.is_empty() {
                return state.set(AppState::Error(describe(Some("empty_name"))));
            }
            name_domain_input.set(String::new());
            name_input.set(String::new());
            run(Command::SetDomainName { domain, name }, "Group name saved");
        })
    };

    let on_remove_name = {
        let run = run.clone();
        move |domain: String| {
            let run = run.clone();
            Callback::from(move |_: MouseEvent| run(Command::RemoveDomainName { domain: domain.clone() }, "Group name removed"))
        }
    };

    let is_busy = matches!(*state, AppState::Loading(_));

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Tab Grouper"}</h1>

            // Status display
            {match &*state {
                AppState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                AppState::Done(msg) => html! {
                    <Alert r#type={AlertType::Success} title={msg.clone()} inline={true}>
                    </Alert>
                },
                AppState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                AppState::Idle => html! {}
            }}

            <div class="flex-column-gap">
                <label class="pf-v5-c-switch">
                    <input
                        class="pf-v5-c-switch__input"
                        type="checkbox"
                        checked={settings.auto_group_enabled}
                        onchange={on_toggle_auto}
                        disabled={is_busy}
                    />
                    <span class="pf-v5-c-switch__toggle"></span>
                    <span class="pf-v5-c-switch__label">{"Group tabs automatically"}</span>
                </label>
                <label class="pf-v5-c-switch">
                    <input
                        class="pf-v5-c-switch__input"
                        type="checkbox"
                        checked={settings.use_subdomain_grouping}
                        onchange={on_toggle_subdomain}
                        disabled={is_busy}
                    />
                    <span class="pf-v5-c-switch__toggle"></span>
                    <span class="pf-v5-c-switch__label">{"Separate groups per subdomain"}</span>
                </label>
                <Button onclick={on_group_now} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                    {"Group Tabs Now"}
                </Button>
            </div>

            // Excluded domains
            <div class="stats-container">
                <h2 class="stats-title">{"Excluded domains"}</h2>
                <div class="input-row">
                    <input
                        class="pf-v5-c-form-control"
                        placeholder="example.com or *.example.com"
                        value={(*exclude_input).clone()}
                        oninput={text_setter(&exclude_input)}
                    />
                    <Button onclick={on_add_exclusion} disabled={is_busy} variant={ButtonVariant::Secondary}>
                        {"Add"}
                    </Button>
                </div>
                <div class="stats-box">
                    if settings.excluded_domains.is_empty() {
                        <p class="empty-text">{"No excluded domains"}</p>
                    }
                    {for settings.excluded_domains.iter().map(|domain| html! {
                        <div class="stat-item">
                            <span class="stat-domain">{domain}</span>
                            <Button onclick={on_remove_exclusion(domain.clone())} disabled={is_busy} variant={ButtonVariant::Link}>
                                {"Remove"}
                            </Button>
                        </div>
                    })}
                </div>
            </div>

            // Domain colors
            <div class="stats-container">
                <h2 class="stats-title">{"Group colors"}</h2>
                <div class="input-row">
                    <input
                        class="pf-v5-c-form-control"
                        placeholder="example.com"
                        value={(*color_domain_input).clone()}
                        oninput={text_setter(&color_domain_input)}
                    />
                    <select class="pf-v5-c-form-control" onchange={on_color_choice}>
                        {for GroupColor::ALL.iter().map(|color| html! {
                            <option value={color.as_str()} selected={*color == *color_choice}>{color.as_str()}</option>
                        })}
                    </select>
                    <Button onclick={on_set_color} disabled={is_busy} variant={ButtonVariant::Secondary}>
                        {"Set"}
                    </Button>
                </div>
                <div class="stats-box">
                    {for settings.domain_colors.iter().map(|(domain, color)| html! {
                        <div class="stat-item">
                            <span class="color-swatch" style={format!("background-color: {};", color.css())}></span>
                            <span class="stat-domain">{domain}</span>
                            <span class="stat-count">{color.as_str()}</span>
                            <Button onclick={on_remove_color(domain.clone())} disabled={is_busy} variant={ButtonVariant::Link}>
                                {"Remove"}
                            </Button>
                        </div>
                    })}
                </div>
            </div>

            // Group names
            <div class="stats-container">
                <h2 class="stats-title">{"Group names"}</h2>
                <div class="input-row">
                    <input
                        class="pf-v5-c-form-control"
                        placeholder="example.com"
                        value={(*name_domain_input).clone()}
                        oninput={text_setter(&name_domain_input)}
                    />
                    <input
                        class="pf-v5-c-form-control"
                        placeholder="Group name"
                        value={(*name_input).clone()}
                        oninput={text_setter(&name_input)}
                    />
                    <Button onclick={on_set_name} disabled={is_busy} variant={ButtonVariant::Secondary}>
                        {"Set"}
                    </Button>
                </div>
                <div class="stats-box">
                    {for settings.domain_names.iter().map(|(domain, name)| html! {
                        <div class="stat-item">
                            <span class="stat-domain">{domain}</span>
                            <span class="stat-count">{name}</span>
                            <Button onclick={on_remove_name(domain.clone())} disabled={is_busy} variant={ButtonVariant::Link}>
                                {"Remove"}
                            </Button>
                        </div>
                    })}
                </div>
            </div>

            <p class="footer-popup">
                {"Tab Grouper v0.1.0"}
            </p>
        </div>
    }
}

// Helper functions

fn text_setter(handle: &UseStateHandle<String>) -> Callback<InputEvent> {
    let handle = handle.clone();
    Callback::from(move |e: InputEvent| {
        if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
            handle.set(input.value());
        }
    })
}

async fn send(command: &Command) -> Result<CommandResponse, String> {
    let message = command
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))?;

    let reply = sendCommand(message)
        .await
        .map_err(|e| format!("Failed to reach background: {:?}", e))?;

    let response: CommandResponse = serde_wasm_bindgen::from_value(reply)
        .map_err(|e| format!("Failed to parse reply: {:?}", e))?;

    if response.success {
        Ok(response)
    } else {
        Err(describe(response.error.as_deref()))
    }
}

async fn current_settings() -> Result<Settings, String> {
    let response = send(&Command::GetSettings).await?;
    Ok(response.settings.unwrap_or_default())
}

async fn apply(command: Command) -> Result<Settings, String> {
    send(&command).await?;
    current_settings().await
}
