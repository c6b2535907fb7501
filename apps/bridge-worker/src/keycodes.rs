//! Raw key code to logical key identifier lookup.
//!
//! A compact subset of the full translation table (which lives outside this
//! core): letters, digits, and the keys an overlay most commonly displays.
//! Raw codes are Linux input-event key codes; logical identifiers follow the
//! UI-event code naming (`KeyA`, `Digit1`, `ArrowLeft`, ...) so the rendering
//! surface can treat bridge-sourced keys like platform-sourced ones.

/// Translate a raw key code into its logical identifier.
///
/// Codes outside the compact table come back as `Unknown<code>`; the raw
/// code always travels alongside the logical one on the wire, so nothing is
/// lost for consumers that carry their own full table.
pub fn logical_key_code(raw_code: u16) -> String {
    let known = match raw_code {
        1 => "Escape",
        2 => "Digit1",
        3 => "Digit2",
        4 => "Digit3",
        5 => "Digit4",
        6 => "Digit5",
        7 => "Digit6",
        8 => "Digit7",
        9 => "Digit8",
        10 => "Digit9",
        11 => "Digit0",
        14 => "Backspace",
        15 => "Tab",
        16 => "KeyQ",
        17 => "KeyW",
        18 => "KeyE",
        19 => "KeyR",
        20 => "KeyT",
        21 => "KeyY",
        22 => "KeyU",
        23 => "KeyI",
        24 => "KeyO",
        25 => "KeyP",
        28 => "Enter",
        29 => "ControlLeft",
        30 => "KeyA",
        31 => "KeyS",
        32 => "KeyD",
        33 => "KeyF",
        34 => "KeyG",
        35 => "KeyH",
        36 => "KeyJ",
        37 => "KeyK",
        38 => "KeyL",
        42 => "ShiftLeft",
        44 => "KeyZ",
        45 => "KeyX",
        46 => "KeyC",
        47 => "KeyV",
        48 => "KeyB",
        49 => "KeyN",
        50 => "KeyM",
        54 => "ShiftRight",
        56 => "AltLeft",
        57 => "Space",
        97 => "ControlRight",
        100 => "AltRight",
        103 => "ArrowUp",
        105 => "ArrowLeft",
        106 => "ArrowRight",
        108 => "ArrowDown",
        _ => return format!("Unknown{raw_code}"),
    };
    known.to_string()
}
