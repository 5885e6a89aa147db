use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Resolve the collector for the typed postcode and list its addresses
    LookupPostcode,
    /// Fetch bin days for the highlighted address
    LoadBinDays,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Backspace, Char, Down, Enter, Esc, Left, Right, Tab, Up};

    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::PostcodeInput => match key.code {
            Esc => action = Action::Quit,
            Char(character) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    app.postcode_input.push(character);
                }
            }
            Backspace => {
                app.postcode_input.pop();
            }
            Enter => {
                action = Action::LookupPostcode;
            }
            _ => {}
        },

        Screen::AddressSelect => match key.code {
            Char('q') => action = Action::Quit,
            Up | Char('k') => {
                if app.address_list_index > 0 {
                    app.address_list_index -= 1;
                }
            }
            Down | Char('j') => {
                if app.address_list_index + 1 < app.addresses.len() {
                    app.address_list_index += 1;
                }
            }
            Enter | Right | Tab => {
                action = Action::LoadBinDays;
            }
            Left | Esc => {
                app.back_to_postcode();
            }
            _ => {}
        },

        Screen::BinDaysView => match key.code {
            Char('q') => action = Action::Quit,
            Left | Esc | Char('b') => {
                app.screen = Screen::AddressSelect;
            }
            _ => {}
        },
    }
    action
}
