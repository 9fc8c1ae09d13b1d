use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr, Result};

pub(crate) fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = event_name(&input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::ddd_cqrs::Event for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
        }
    })
}

/// 解析 `#[event(name = "...")]`，缺省时使用类型名
fn event_name(input: &DeriveInput) -> Result<LitStr> {
    let mut name: Option<LitStr> = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("event")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                if name.is_some() {
                    return Err(meta.error("duplicate 'name' specified"));
                }
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new(lit.span(), "event name must not be empty"));
                }
                name = Some(lit);
                Ok(())
            } else {
                Err(meta.error("unsupported event attribute, expected `name = \"...\"`"))
            }
        })?;
    }

    Ok(name.unwrap_or_else(|| LitStr::new(&input.ident.to_string(), input.ident.span())))
}
