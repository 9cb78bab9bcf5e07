use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Implements `softcascade::Entity` for a struct with named fields.
///
/// ```ignore
/// #[derive(Debug, Entity)]
/// #[entity(name = "OrderLine", soft_delete = "deleted_at")]
/// struct OrderLine {
///     #[entity(id)]
///     id: i64,
///     order: Option<i64>,
///     deleted_at: Option<DateTime<Utc>>,
///     #[entity(skip)]
///     cached_total: u64,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct EntityOptions {
    name: Option<String>,
    soft_delete: Option<LitStr>,
}

#[derive(Default)]
struct FieldOptions {
    id: bool,
    skip: bool,
}

struct EntityField {
    ident: Ident,
    ty: Type,
    id: bool,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity does not support generic structs",
        ));
    }

    let options = parse_entity_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity requires named fields",
            ));
        }
    };

    let mut fields = Vec::<EntityField>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let field_options = parse_field_options(&field.attrs)?;
        if field_options.skip {
            continue;
        }
        fields.push(EntityField {
            ident,
            ty: field.ty,
            id: field_options.id,
        });
    }

    let id_fields = fields.iter().filter(|f| f.id).map(|f| &f.ident).collect::<Vec<_>>();
    if id_fields.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires at least one #[entity(id)] field",
        ));
    }

    let entity_name = options.name.unwrap_or_else(|| struct_name.to_string());

    let field_names = fields.iter().map(|f| f.ident.to_string()).collect::<Vec<_>>();
    let field_idents = fields.iter().map(|f| &f.ident).collect::<Vec<_>>();
    let field_types = fields.iter().map(|f| &f.ty).collect::<Vec<_>>();

    let soft_deleteable_impl = match &options.soft_delete {
        Some(marker) => {
            if !field_names.contains(&marker.value()) {
                return Err(syn::Error::new(
                    marker.span(),
                    format!(
                        "soft_delete field '{}' is not a mapped field of {}",
                        marker.value(),
                        struct_name
                    ),
                ));
            }
            quote! {
                impl ::softcascade::SoftDeleteable for #struct_name {
                    const ENTITY_NAME: &'static str = #entity_name;
                    const DELETION_MARKER_FIELD: &'static str = #marker;
                }
            }
        }
        None => quote! {},
    };

    Ok(quote! {
        impl ::softcascade::Entity for #struct_name {
            fn entity_type(&self) -> &str {
                #entity_name
            }

            fn identifier_values(&self) -> ::std::vec::Vec<::softcascade::Value> {
                ::std::vec![
                    #( ::softcascade::FieldValue::to_value(&self.#id_fields) ),*
                ]
            }

            fn field_value(&self, field: &str) -> ::softcascade::Result<::softcascade::Value> {
                match field {
                    #( #field_names => ::std::result::Result::Ok(::softcascade::FieldValue::to_value(&self.#field_idents)), )*
                    _ => ::std::result::Result::Err(::softcascade::CascadeError::FieldNotFound(
                        field.to_string(),
                        #entity_name.to_string(),
                    )),
                }
            }

            fn set_field_value(
                &mut self,
                field: &str,
                value: ::softcascade::Value,
            ) -> ::softcascade::Result<()> {
                match field {
                    #(
                        #field_names => {
                            self.#field_idents = <#field_types as ::softcascade::FieldValue>::from_value(value)?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => ::std::result::Result::Err(::softcascade::CascadeError::FieldNotFound(
                        field.to_string(),
                        #entity_name.to_string(),
                    )),
                }
            }
        }

        #soft_deleteable_impl
    })
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions {
        name: None,
        soft_delete: None,
    };

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("soft_delete") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                if lit.value().trim().is_empty() {
                    return Err(syn::Error::new(lit.span(), "soft_delete field must not be empty"));
                }
                options.soft_delete = Some(lit);
                return Ok(());
            }

            Err(meta.error(
                "Unsupported entity attribute. Supported: name = \"...\", soft_delete = \"...\"",
            ))
        })?;
    }

    Ok(options)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                options.id = true;
                return Ok(());
            }

            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            Err(meta.error("Unsupported #[entity(...)] field option. Supported: id, skip"))
        })?;

        if options.id && options.skip {
            return Err(syn::Error::new(
                attr.span(),
                "#[entity(skip)] cannot be combined with #[entity(id)]",
            ));
        }
    }

    Ok(options)
}
