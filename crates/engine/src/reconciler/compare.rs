//! Field-by-field comparison of a recorded future declaration against the
//! current one. The callers guarantee both sides share a kind.

use crate::module::FutureKind;

pub(super) fn compare_kinds(recorded: &FutureKind, current: &FutureKind, problems: &mut Vec<String>) {
    use FutureKind::*;

    let mut changed = |field: &str| {
        problems.push(format!("{field} changed since the future was executed"));
    };

    match (recorded, current) {
        (
            ContractDeployment {
                contract_name: r_name,
                bytecode: r_code,
                constructor_args: r_args,
                libraries: r_libs,
                value: r_value,
                from: r_from,
            },
            ContractDeployment {
                contract_name: c_name,
                bytecode: c_code,
                constructor_args: c_args,
                libraries: c_libs,
                value: c_value,
                from: c_from,
            },
        ) => {
            if r_name != c_name {
                changed("contract name");
            }
            if r_code != c_code {
                changed("bytecode");
            }
            if r_args != c_args {
                changed("constructor arguments");
            }
            if r_libs != c_libs {
                changed("linked libraries");
            }
            if r_value != c_value {
                changed("value");
            }
            if r_from != c_from {
                changed("sender account");
            }
        }

        (
            ContractAt {
                contract_name: r_name,
                address: r_addr,
            },
            ContractAt {
                contract_name: c_name,
                address: c_addr,
            },
        ) => {
            if r_name != c_name {
                changed("contract name");
            }
            if r_addr != c_addr {
                changed("address");
            }
        }

        (
            ContractCall {
                target: r_target,
                function_name: r_fn,
                args: r_args,
                value: r_value,
                from: r_from,
            },
            ContractCall {
                target: c_target,
                function_name: c_fn,
                args: c_args,
                value: c_value,
                from: c_from,
            },
        ) => {
            if r_target != c_target {
                changed("target");
            }
            if r_fn != c_fn {
                changed("function name");
            }
            if r_args != c_args {
                changed("arguments");
            }
            if r_value != c_value {
                changed("value");
            }
            if r_from != c_from {
                changed("sender account");
            }
        }

        (
            StaticCall {
                target: r_target,
                function_name: r_fn,
                args: r_args,
                from: r_from,
                result_word: r_word,
            },
            StaticCall {
                target: c_target,
                function_name: c_fn,
                args: c_args,
                from: c_from,
                result_word: c_word,
            },
        ) => {
            if r_target != c_target {
                changed("target");
            }
            if r_fn != c_fn {
                changed("function name");
            }
            if r_args != c_args {
                changed("arguments");
            }
            if r_from != c_from {
                changed("sender account");
            }
            if r_word != c_word {
                changed("result selection");
            }
        }

        (
            EncodedFunctionCall {
                target: r_target,
                function_name: r_fn,
                args: r_args,
            },
            EncodedFunctionCall {
                target: c_target,
                function_name: c_fn,
                args: c_args,
            },
        ) => {
            if r_target != c_target {
                changed("target");
            }
            if r_fn != c_fn {
                changed("function name");
            }
            if r_args != c_args {
                changed("arguments");
            }
        }

        (
            SendData {
                to: r_to,
                data: r_data,
                value: r_value,
                from: r_from,
            },
            SendData {
                to: c_to,
                data: c_data,
                value: c_value,
                from: c_from,
            },
        ) => {
            if r_to != c_to {
                changed("recipient");
            }
            if r_data != c_data {
                changed("data");
            }
            if r_value != c_value {
                changed("value");
            }
            if r_from != c_from {
                changed("sender account");
            }
        }

        (
            ReadEventArgument {
                emitter: r_emitter,
                event_name: r_event,
                argument: r_arg,
                event_index: r_index,
            },
            ReadEventArgument {
                emitter: c_emitter,
                event_name: c_event,
                argument: c_arg,
                event_index: c_index,
            },
        ) => {
            if r_emitter != c_emitter {
                changed("emitter");
            }
            if r_event != c_event {
                changed("event name");
            }
            if r_arg != c_arg {
                changed("argument slot");
            }
            if r_index != c_index {
                changed("event index");
            }
        }

        // Kind mismatch is reported by the caller before getting here.
        _ => {}
    }
}
