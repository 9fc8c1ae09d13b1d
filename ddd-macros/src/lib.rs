use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod event;

/// 事件派生宏
/// - 为目标类型实现 `::ddd_cqrs::Event`
/// - 事件名默认取类型名，可通过 `#[event(name = "...")]` 覆写
/// - 序列化由 serde 负责，需同时派生 `Serialize`/`Deserialize`
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    event::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
