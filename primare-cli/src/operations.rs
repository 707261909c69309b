//! Operation table shared by subcommands and the interactive shell
//!
//! Each entry names one public client operation, the kind of value it
//! takes and a one-line description. [`invoke`] runs an entry by name.

use primare_control::AmplifierClient;

use crate::error::CliError;

/// What an operation takes on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Nothing
    None,
    /// `true` or `false`
    Bool,
    /// A number
    Int,
}

/// A value typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    /// `true`/`false` (any case) become booleans, everything else must be
    /// an integer
    pub fn parse(token: &str) -> Result<Self, CliError> {
        if token.eq_ignore_ascii_case("true") {
            Ok(Value::Bool(true))
        } else if token.eq_ignore_ascii_case("false") {
            Ok(Value::Bool(false))
        } else {
            token
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CliError::BadToken(token.to_string()))
        }
    }
}

/// One entry in the table
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub arg: ArgKind,
    pub help: &'static str,
}

const fn op(name: &'static str, arg: ArgKind, help: &'static str) -> Operation {
    Operation { name, arg, help }
}

/// Every operation, sorted by name
pub const OPERATIONS: &[Operation] = &[
    op("balance_adjust_left", ArgKind::None, "Move the balance one step left."),
    op("balance_adjust_right", ArgKind::None, "Move the balance one step right."),
    op("balance_set", ArgKind::Int, "Set balance: 0 centred, 1-9 right, 11-19 left."),
    op("calibrate_volume", ArgKind::None, "Step volume down and up to read the current step."),
    op("device_info", ArgKind::None, "Read manufacturer, model, software version and input name."),
    op("dim_cycle", ArgKind::None, "Cycle through the display dim levels."),
    op("dim_set", ArgKind::Int, "Select a dim level (0-3)."),
    op("input_next", ArgKind::None, "Select the next input."),
    op("input_prev", ArgKind::None, "Select the previous input."),
    op("input_set", ArgKind::Int, "Select an input by number."),
    op("inputname_current_get", ArgKind::None, "Read the name of the current input."),
    op("inputname_specific_get", ArgKind::Int, "Read the name of an input by number."),
    op("ir_input_set", ArgKind::Bool, "Select the IR receiver: true for back, false for front."),
    op("ir_input_toggle", ArgKind::None, "Switch between the front and back IR receivers."),
    op("manufacturer_get", ArgKind::None, "Read the manufacturer name."),
    op("menu_set", ArgKind::Int, "Navigate the on-screen menu."),
    op("menu_toggle", ArgKind::None, "Open or close the menu."),
    op("modelname_get", ArgKind::None, "Read the model name."),
    op("mute_get", ArgKind::None, "Show the last reported mute state."),
    op("mute_set", ArgKind::Bool, "Mute (true) or unmute (false)."),
    op("mute_toggle", ArgKind::None, "Toggle mute."),
    op("power_off", ArgKind::None, "Enter standby."),
    op("power_on", ArgKind::None, "Leave standby."),
    op("power_toggle", ArgKind::None, "Toggle power."),
    op("recall_factory_settings", ArgKind::None, "Restore factory settings and restart."),
    op("remote_cmd", ArgKind::Int, "Send an IR remote code."),
    op("setup", ArgKind::None, "Power on, enable verbose mode, unmute and read device info."),
    op("state", ArgKind::None, "Show everything known about the amplifier."),
    op("swversion_get", ArgKind::None, "Read the software version."),
    op("verbose_set", ArgKind::Bool, "Enable (true) or disable (false) verbose mode."),
    op("verbose_toggle", ArgKind::None, "Toggle verbose mode."),
    op("volume_down", ArgKind::None, "Decrease volume by one step."),
    op("volume_get", ArgKind::None, "Show the last reported volume (0-100)."),
    op("volume_query", ArgKind::None, "Ask the amplifier for its volume (0-100)."),
    op("volume_set", ArgKind::Int, "Set volume (0-100)."),
    op("volume_up", ArgKind::None, "Increase volume by one step."),
];

/// Look up an operation by exact name
pub fn find(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|o| o.name == name)
}

/// Operations whose name starts with `prefix`
pub fn matching(prefix: &str) -> impl Iterator<Item = &'static Operation> + '_ {
    OPERATIONS.iter().filter(move |o| o.name.starts_with(prefix))
}

/// Help text listing every operation
pub fn help_text() -> String {
    let mut text = String::from("Available operations:\n");
    for operation in OPERATIONS {
        let arg = match operation.arg {
            ArgKind::None => "",
            ArgKind::Bool => "<bool>",
            ArgKind::Int => "<n>",
        };
        text.push_str(&format!(
            "  {:<25} {:<7} {}\n",
            operation.name, arg, operation.help
        ));
    }
    text
}

fn check_arg(operation: &Operation, value: Option<Value>) -> Result<Option<Value>, CliError> {
    match (operation.arg, value) {
        (ArgKind::None, None) => Ok(None),
        (ArgKind::None, Some(_)) => Err(CliError::UnexpectedArgument(operation.name)),
        (_, None) => Err(CliError::MissingArgument(operation.name)),
        (_, Some(value)) => Ok(Some(value)),
    }
}

fn byte(operation: &Operation, value: Option<Value>) -> Result<u8, CliError> {
    match value {
        Some(Value::Int(n)) => u8::try_from(n).map_err(|_| CliError::BadArgument {
            operation: operation.name,
            expected: "a number from 0 to 255",
        }),
        _ => Err(CliError::BadArgument {
            operation: operation.name,
            expected: "a number",
        }),
    }
}

fn flag(operation: &Operation, value: Option<Value>) -> Result<bool, CliError> {
    match value {
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::Int(0)) => Ok(false),
        Some(Value::Int(1)) => Ok(true),
        _ => Err(CliError::BadArgument {
            operation: operation.name,
            expected: "true or false",
        }),
    }
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "unknown".to_string(),
    }
}

const OK: &str = "ok";

/// Run the operation called `name`; returns text to show the user
pub async fn invoke(
    client: &AmplifierClient,
    name: &str,
    value: Option<Value>,
) -> Result<String, CliError> {
    let operation = find(name).ok_or_else(|| CliError::UnknownOperation(name.to_string()))?;
    let value = check_arg(operation, value)?;

    let output: String = match operation.name {
        "balance_adjust_left" => client.balance_adjust_left().await.map(|_| OK.into())?,
        "balance_adjust_right" => client.balance_adjust_right().await.map(|_| OK.into())?,
        "balance_set" => client
            .balance_set(byte(operation, value)?)
            .await
            .map(|_| OK.into())?,
        "calibrate_volume" => show(client.calibrate_volume().await?),
        "device_info" => {
            let info = client.device_info().await?;
            format!(
                "Manufacturer:  {}\nModel:         {}\nSW Version:    {}\nCurrent input: {}",
                info.manufacturer, info.model, info.software_version, info.input_name
            )
        }
        "dim_cycle" => show(client.dim_cycle().await?),
        "dim_set" => client.dim_set(byte(operation, value)?).await.map(|_| OK.into())?,
        "input_next" => client.input_next().await?,
        "input_prev" => client.input_prev().await?,
        "input_set" => client.input_set(byte(operation, value)?).await?,
        "inputname_current_get" => client.inputname_current_get().await?,
        "inputname_specific_get" => {
            client
                .inputname_specific_get(byte(operation, value)?)
                .await?
        }
        "ir_input_set" => client
            .ir_input_set(flag(operation, value)?)
            .await
            .map(|_| OK.into())?,
        "ir_input_toggle" => show(client.ir_input_toggle().await?),
        "manufacturer_get" => client.manufacturer_get().await?,
        "menu_set" => client.menu_set(byte(operation, value)?).await.map(|_| OK.into())?,
        "menu_toggle" => show(client.menu_toggle().await?),
        "modelname_get" => client.modelname_get().await?,
        "mute_get" => show(client.mute_get()),
        "mute_set" => client.mute_set(flag(operation, value)?).await.map(|_| OK.into())?,
        "mute_toggle" => show(client.mute_toggle().await?),
        "power_off" => client.power_off().await.map(|_| OK.into())?,
        "power_on" => client.power_on().await.map(|_| OK.into())?,
        "power_toggle" => show(client.power_toggle().await?),
        "recall_factory_settings" => client.recall_factory_settings().await.map(|_| OK.into())?,
        "remote_cmd" => client.remote_cmd(byte(operation, value)?).await.map(|_| OK.into())?,
        "setup" => {
            let info = client.setup(None).await?;
            format!("Connected to {} {}", info.manufacturer, info.model)
        }
        "state" => format!("{:#?}", client.state()),
        "swversion_get" => client.swversion_get().await?,
        "verbose_set" => client
            .verbose_set(flag(operation, value)?)
            .await
            .map(|_| OK.into())?,
        "verbose_toggle" => show(client.verbose_toggle().await?),
        "volume_down" => show(client.volume_down().await?),
        "volume_get" => show(client.volume_get()),
        "volume_query" => client.volume_query().await?.to_string(),
        "volume_set" => client
            .volume_set(byte(operation, value)?)
            .await
            .map(|_| OK.into())?,
        "volume_up" => show(client.volume_up().await?),
        other => return Err(CliError::UnknownOperation(other.to_string())),
    };
    Ok(output)
}
